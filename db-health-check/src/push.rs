use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lifecycle::ManagedTask;
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PushConfig;
use crate::error::PushError;
use crate::metrics::EXPOSITION_CONTENT_TYPE;
use crate::metrics_consts::METRICS_PUSHES;

pub const PUSH_TASK: &str = "metrics-push";

const PUSH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Mirrors the metrics registry to a file and/or a pushgateway.
pub struct MetricsPusher {
    handle: PrometheusHandle,
    client: reqwest::Client,
    endpoint: Option<Url>,
    file: Option<PathBuf>,
    interval: Duration,
}

impl MetricsPusher {
    pub fn new(handle: PrometheusHandle, config: &PushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            handle,
            client,
            endpoint: config
                .gateway_url
                .as_ref()
                .map(|base| gateway_endpoint(base, &config.job)),
            file: config.file.clone(),
            interval: config.interval,
        })
    }

    /// Render one snapshot and send it to every configured destination. A failing destination
    /// does not prevent the others from being tried. Returns true if every destination succeeded.
    pub async fn push_once(&self) -> bool {
        let payload = self.handle.render();
        let mut ok = true;

        if let Some(path) = &self.file {
            let result = write_atomically(path, &payload).await;
            ok &= report("file", &result);
        }

        if let Some(endpoint) = &self.endpoint {
            let result = self.send(endpoint, payload).await;
            ok &= report("gateway", &result);
        }

        ok
    }

    async fn send(&self, endpoint: &Url, payload: String) -> Result<(), PushError> {
        let response = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status(status));
        }
        Ok(())
    }
}

/// Start the push timer. The first push happens immediately, then one per interval measured
/// from the end of the previous push.
pub fn spawn_push_timer(pusher: MetricsPusher) -> ManagedTask {
    ManagedTask::spawn(PUSH_TASK, move |token| async move {
        info!(
            interval_secs = pusher.interval.as_secs(),
            file = ?pusher.file,
            gateway = pusher.endpoint.as_ref().map(Url::as_str),
            "metrics push timer started"
        );

        loop {
            pusher.push_once().await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pusher.interval) => {}
            }
        }

        info!("metrics push timer stopped");
    })
}

/// `{base}/metrics/job/{job}`, keeping any path prefix on the base URL.
fn gateway_endpoint(base: &Url, job: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["metrics", "job", job]);
    }
    url
}

/// Readers never see a partially written file: write a sibling then rename it into place.
async fn write_atomically(path: &Path, payload: &str) -> Result<(), PushError> {
    let io_error = |source| PushError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut tmp_name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("metrics"));
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, payload).await.map_err(io_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error)
}

fn report(destination: &'static str, result: &Result<(), PushError>) -> bool {
    match result {
        Ok(()) => {
            debug!(destination, "metrics pushed");
            metrics::counter!(METRICS_PUSHES, "destination" => destination, "result" => "success")
                .increment(1);
            true
        }
        Err(e) => {
            warn!(destination, error = %e, "failed to push metrics");
            metrics::counter!(METRICS_PUSHES, "destination" => destination, "result" => "failure")
                .increment(1);
            false
        }
    }
}
