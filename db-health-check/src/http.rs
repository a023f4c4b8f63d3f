use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use lifecycle::{ManagedTask, PhaseCell, TaskExit};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ListenerError;
use crate::metrics::track_metrics;
use crate::metrics_consts::READINESS_CHECKS;
use crate::probe::ProbeClient;
use crate::readiness::ReadinessState;

pub const LIVE_BODY: &str = "OK";
pub const READY_BODY: &str = "READY";
pub const NOT_READY_BODY: &str = "NOT READY";

#[derive(Clone)]
struct HealthState {
    client: Arc<dyn ProbeClient>,
    readiness_timeout: Duration,
    readiness: ReadinessState,
    phase: PhaseCell,
}

/// Liveness, readiness and status routes.
///
/// `/ready` runs its own bounded ping against the pool on every request rather than reading the
/// scheduled outcome, so each readiness poll costs one query. `/status` is the read-only view of
/// the last scheduled outcome.
pub fn health_router(
    client: Arc<dyn ProbeClient>,
    readiness_timeout: Duration,
    readiness: ReadinessState,
    phase: PhaseCell,
) -> Router {
    let state = HealthState {
        client,
        readiness_timeout,
        readiness,
        phase,
    };

    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state)
}

async fn liveness() -> &'static str {
    LIVE_BODY
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    if !state.phase.is_running() {
        metrics::counter!(READINESS_CHECKS, "result" => "not_running").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_BODY);
    }

    if state.client.ping(state.readiness_timeout).await {
        metrics::counter!(READINESS_CHECKS, "result" => "ready").increment(1);
        (StatusCode::OK, READY_BODY)
    } else {
        metrics::counter!(READINESS_CHECKS, "result" => "not_ready").increment(1);
        (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_BODY)
    }
}

async fn status(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let outcome = state.readiness.latest();
    Json(json!({
        "success": outcome.success,
        "observed_at": outcome.observed_at,
        "detail": outcome.detail,
        "phase": state.phase.get().as_str(),
    }))
}

/// A bound HTTP listener serving one router in the background.
///
/// Stopping happens in two halves so the coordinator can put other work in between:
/// [`stop_accepting`](Listener::stop_accepting) closes the accept loop, and
/// [`drain`](Listener::drain) waits for in-flight requests.
pub struct Listener {
    name: &'static str,
    local_addr: SocketAddr,
    task: ManagedTask,
}

impl Listener {
    pub async fn bind(
        name: &'static str,
        bind: &str,
        router: Router,
    ) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError {
            name,
            bind: bind.to_owned(),
            source,
        };

        let listener = TcpListener::bind(bind).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let task = ManagedTask::spawn(format!("{name}-listener"), move |token| async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(listener = name, error = %e, "listener failed");
            }
        });

        info!(listener = name, %local_addr, "listening");
        Ok(Self {
            name,
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Requests already being served carry on.
    pub fn stop_accepting(&self) {
        self.task.cancel();
    }

    /// Token equivalent of [`stop_accepting`](Listener::stop_accepting).
    pub fn stop_accepting_token(&self) -> CancellationToken {
        self.task.cancellation_token()
    }

    /// Wait up to `timeout` for in-flight requests to finish, then drop whatever is left.
    pub async fn drain(self, timeout: Duration) -> Result<(), String> {
        match self.task.stop(timeout).await {
            TaskExit::Completed => Ok(()),
            TaskExit::Aborted => Err(format!(
                "{} listener did not drain within {timeout:?}",
                self.name
            )),
            TaskExit::Panicked => Err(format!("{} listener panicked", self.name)),
        }
    }
}
