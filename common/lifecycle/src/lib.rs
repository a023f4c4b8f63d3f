//! Process lifecycle primitives: a monotonic phase cell, cancellable background tasks with a
//! bounded stop, and an ordered shutdown sequence where every step is time-boxed and runs even
//! if the ones before it failed.

mod error;
mod metrics;
mod phase;
mod sequence;
mod signals;
mod task;

pub use error::LifecycleError;
pub use phase::{LifecyclePhase, PhaseCell};
pub use sequence::{ShutdownReport, ShutdownSequence, StepReport, StepResult};
pub use signals::wait_for_shutdown_signal;
pub use task::{ManagedTask, TaskExit};
