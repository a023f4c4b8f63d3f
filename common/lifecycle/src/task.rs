//! Background worker paired with its own cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics;

/// How a [`ManagedTask`] ended when it was stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskExit {
    /// The worker observed cancellation and returned within its grace period.
    Completed,
    /// The grace period ran out and the worker was aborted.
    Aborted,
    /// The worker panicked.
    Panicked,
}

impl TaskExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskExit::Completed => "completed",
            TaskExit::Aborted => "aborted",
            TaskExit::Panicked => "panicked",
        }
    }
}

/// A spawned worker that can be stopped cooperatively, with a hard abort as fallback.
///
/// The worker receives a [`CancellationToken`] and is expected to return soon after it fires,
/// typically by racing it against its sleeps in a `tokio::select!`. Dropping a `ManagedTask`
/// cancels the token but does not wait.
pub struct ManagedTask {
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ManagedTask {
    pub fn spawn<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(work(token.clone()));
        Self {
            name: name.into(),
            token,
            join,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the worker to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A handle that cancels the worker, for callers that must trigger the stop from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the worker and wait up to `grace` for it to return; abort it otherwise.
    /// Never waits longer than `grace` plus the time the runtime needs to drop the aborted
    /// future.
    pub async fn stop(mut self, grace: Duration) -> TaskExit {
        self.token.cancel();

        let exit = match tokio::time::timeout(grace, &mut self.join).await {
            Ok(Ok(())) => TaskExit::Completed,
            Ok(Err(e)) if e.is_panic() => {
                warn!(task = %self.name, "task panicked before shutdown");
                TaskExit::Panicked
            }
            Ok(Err(_)) => TaskExit::Aborted,
            Err(_) => {
                warn!(
                    task = %self.name,
                    grace_secs = grace.as_secs_f64(),
                    "task did not stop within its grace period, aborting"
                );
                self.join.abort();
                drop((&mut self.join).await);
                TaskExit::Aborted
            }
        };

        info!(task = %self.name, exit = exit.as_str(), "task stopped");
        metrics::emit_task_stopped(&self.name, exit.as_str());
        exit
    }
}

impl Drop for ManagedTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
