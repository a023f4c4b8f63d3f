//! Lifecycle error types surfaced by a [`ShutdownReport`](crate::ShutdownReport).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A shutdown step returned an error.
    #[error("shutdown step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A shutdown step did not finish within its budget and was abandoned.
    #[error("shutdown step '{step}' timed out after {timeout:?}")]
    StepTimedOut { step: String, timeout: Duration },

    /// A shutdown step panicked.
    #[error("shutdown step '{step}' panicked")]
    StepPanicked { step: String },
}
