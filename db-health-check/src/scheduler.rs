use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use lifecycle::ManagedTask;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ScheduleConfig;
use crate::metrics_consts::{
    PROBE_DURATION, PROBE_EXECUTIONS, PROBE_LAST_SUCCESS, PROBE_UP, SCHEDULER_PANICS,
};
use crate::probe::{ProbeClient, ProbeOutcome};
use crate::readiness::ReadinessWriter;

pub const SCHEDULER_TASK: &str = "probe-scheduler";

/// Start the probe loop. The first probe runs immediately; each following one starts
/// `config.interval` after the previous one finished, so executions never overlap and a slow
/// probe stretches the cadence instead of queueing ticks.
///
/// Stopping the returned task cancels the pending delay. A probe already in flight is left to
/// finish, or aborted by [`ManagedTask::stop`] once its grace period runs out.
pub fn spawn_scheduler(
    client: Arc<dyn ProbeClient>,
    writer: ReadinessWriter,
    config: ScheduleConfig,
) -> ManagedTask {
    ManagedTask::spawn(SCHEDULER_TASK, move |token| {
        run_scheduler(client, writer, config, token)
    })
}

async fn run_scheduler(
    client: Arc<dyn ProbeClient>,
    writer: ReadinessWriter,
    config: ScheduleConfig,
    token: CancellationToken,
) {
    info!(
        interval_secs = config.interval.as_secs_f64(),
        "probe scheduler started"
    );

    while !token.is_cancelled() {
        let outcome = run_once(client.as_ref()).await;
        writer.publish(outcome);

        if config.interval.is_zero() {
            // Back-to-back mode still has to let the runtime schedule other work.
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }

    info!("probe scheduler stopped");
}

/// Run a single probe, turning a panic in the client into a failed outcome.
async fn run_once(client: &dyn ProbeClient) -> ProbeOutcome {
    let start = Instant::now();

    let outcome = match AssertUnwindSafe(client.execute()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(reason, "probe panicked, treating as failure");
            metrics::counter!(SCHEDULER_PANICS).increment(1);
            ProbeOutcome::failed(format!("probe panicked: {reason}"))
        }
    };

    record(&outcome, start);
    outcome
}

fn record(outcome: &ProbeOutcome, start: Instant) {
    let result = if outcome.success { "success" } else { "failure" };
    metrics::counter!(PROBE_EXECUTIONS, "result" => result).increment(1);
    metrics::histogram!(PROBE_DURATION).record(start.elapsed().as_secs_f64());
    if outcome.success {
        metrics::gauge!(PROBE_UP).set(1.0);
        metrics::gauge!(PROBE_LAST_SUCCESS).set(outcome.observed_at.timestamp() as f64);
    } else {
        metrics::gauge!(PROBE_UP).set(0.0);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
