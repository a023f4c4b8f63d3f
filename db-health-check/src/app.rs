use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lifecycle::{
    LifecyclePhase, ManagedTask, PhaseCell, ShutdownReport, ShutdownSequence, TaskExit,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info};

use crate::config::{Settings, ShutdownConfig};
use crate::http::{health_router, Listener};
use crate::metrics::metrics_router;
use crate::probe::ProbeClient;
use crate::push::{spawn_push_timer, MetricsPusher};
use crate::readiness::readiness_channel;
use crate::scheduler::spawn_scheduler;

pub const SERVICE_NAME: &str = "db-health-check";

// Cancelling tokens never blocks; this only bounds a misbehaving runtime.
const STOP_ACCEPTING_TIMEOUT: Duration = Duration::from_secs(1);
// Slack on top of a task's own grace so the step timeout never fires before the abort does.
const STEP_SLACK: Duration = Duration::from_secs(1);

/// Owns every running component and the order they start and stop in.
pub struct Coordinator {
    phase: PhaseCell,
    client: Arc<dyn ProbeClient>,
    metrics_listener: Option<Listener>,
    push_timer: Option<ManagedTask>,
    health_listener: Option<Listener>,
    scheduler: ManagedTask,
    shutdown: ShutdownConfig,
}

impl Coordinator {
    /// Start the metrics listener, the push timer, the health listener and finally the probe
    /// scheduler. A listener that fails to bind or a push timer that cannot be built is logged
    /// and left out; nothing here aborts startup.
    pub async fn start(
        settings: &Settings,
        client: Arc<dyn ProbeClient>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let phase = PhaseCell::new();

        let metrics_listener = bind_or_skip(
            "metrics",
            &settings.listeners.metrics_bind(),
            metrics_router(metrics_handle.clone()),
        )
        .await;

        let push_timer = if settings.push.is_enabled() {
            match MetricsPusher::new(metrics_handle, &settings.push) {
                Ok(pusher) => Some(spawn_push_timer(pusher)),
                Err(e) => {
                    error!(error = %e, "failed to build metrics pusher, push disabled");
                    None
                }
            }
        } else {
            None
        };

        let (writer, readiness) = readiness_channel();
        let health_listener = bind_or_skip(
            "health",
            &settings.listeners.health_bind(),
            health_router(
                client.clone(),
                settings.probe.timeout(),
                readiness,
                phase.clone(),
            ),
        )
        .await;

        let scheduler = spawn_scheduler(client.clone(), writer, settings.schedule);

        phase.advance(LifecyclePhase::Running);
        info!(
            metrics = ?metrics_listener.as_ref().map(Listener::local_addr),
            health = ?health_listener.as_ref().map(Listener::local_addr),
            push = push_timer.is_some(),
            service = SERVICE_NAME,
            "started"
        );

        Self {
            phase,
            client,
            metrics_listener,
            push_timer,
            health_listener,
            scheduler,
            shutdown: settings.shutdown,
        }
    }

    pub fn phase(&self) -> PhaseCell {
        self.phase.clone()
    }

    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health_listener.as_ref().map(Listener::local_addr)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_listener.as_ref().map(Listener::local_addr)
    }

    /// Wait for `signal`, then shut down.
    pub async fn run_until<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = &'static str>,
    {
        let received = signal.await;
        info!(signal = received, "starting shutdown");
        self.shutdown().await
    }

    /// Stop accepting HTTP connections, stop the scheduler, stop the push timer, close the pool
    /// and finally drain both listeners. Each step is time-boxed and runs regardless of how the
    /// previous one ended.
    pub async fn shutdown(self) -> ShutdownReport {
        self.phase.advance(LifecyclePhase::Stopping);
        let config = self.shutdown;

        let listeners: Vec<Listener> = [self.metrics_listener, self.health_listener]
            .into_iter()
            .flatten()
            .collect();
        let stop_tokens: Vec<_> = listeners
            .iter()
            .map(Listener::stop_accepting_token)
            .collect();

        let scheduler = self.scheduler;
        let push_timer = self.push_timer;
        let client = self.client;

        let report = ShutdownSequence::new(SERVICE_NAME)
            .step("stop_accepting", STOP_ACCEPTING_TIMEOUT, move || async move {
                for token in stop_tokens {
                    token.cancel();
                }
                Ok(())
            })
            .step(
                "scheduler",
                config.scheduler_grace.saturating_add(STEP_SLACK),
                move || async move { stop_task(scheduler, config.scheduler_grace).await },
            )
            .step(
                "push_timer",
                config.push_grace.saturating_add(STEP_SLACK),
                move || async move {
                    match push_timer {
                        Some(task) => stop_task(task, config.push_grace).await,
                        None => Ok(()),
                    }
                },
            )
            .step("pool", config.pool_close, move || async move {
                client.close().await;
                Ok(())
            })
            .step(
                "listeners",
                config.listener_drain.saturating_add(STEP_SLACK),
                move || async move {
                    let results =
                        join_all(listeners.into_iter().map(|l| l.drain(config.listener_drain)))
                            .await;
                    let errors: Vec<String> = results.into_iter().filter_map(Result::err).collect();
                    if errors.is_empty() {
                        Ok(())
                    } else {
                        Err(errors.join("; "))
                    }
                },
            )
            .run()
            .await;

        self.phase.advance(LifecyclePhase::Stopped);
        report
    }
}

async fn bind_or_skip(
    name: &'static str,
    bind: &str,
    router: axum::Router,
) -> Option<Listener> {
    match Listener::bind(name, bind, router).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            error!(error = %e, "listener not started");
            None
        }
    }
}

async fn stop_task(task: ManagedTask, grace: Duration) -> Result<(), String> {
    let name = task.name().to_owned();
    match task.stop(grace).await {
        TaskExit::Completed => Ok(()),
        TaskExit::Aborted => Err(format!("{name} abandoned after {grace:?}")),
        TaskExit::Panicked => Err(format!("{name} panicked")),
    }
}
