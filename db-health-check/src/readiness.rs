use std::sync::Arc;

use tokio::sync::watch;

use crate::probe::ProbeOutcome;

/// Create the outcome cell. There is exactly one writer, owned by the scheduler, and any number
/// of readers. It starts out holding [`ProbeOutcome::pending`].
pub fn readiness_channel() -> (ReadinessWriter, ReadinessState) {
    let (tx, rx) = watch::channel(Arc::new(ProbeOutcome::pending()));
    (ReadinessWriter { tx }, ReadinessState { rx })
}

/// The single write handle. Deliberately not `Clone`.
#[derive(Debug)]
pub struct ReadinessWriter {
    tx: watch::Sender<Arc<ProbeOutcome>>,
}

impl ReadinessWriter {
    /// Replace the current outcome. Works whether or not any reader is still alive.
    pub fn publish(&self, outcome: ProbeOutcome) {
        self.tx.send_replace(Arc::new(outcome));
    }

    pub fn subscribe(&self) -> ReadinessState {
        ReadinessState {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read handle on the most recently completed probe outcome.
#[derive(Clone, Debug)]
pub struct ReadinessState {
    rx: watch::Receiver<Arc<ProbeOutcome>>,
}

impl ReadinessState {
    pub fn latest(&self) -> Arc<ProbeOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait until the writer publishes a new outcome. Returns `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<Arc<ProbeOutcome>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
