//! Monotonic process phase.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where the process is in its life. Ordered: a phase only ever moves to a later variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LifecyclePhase {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LifecyclePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecyclePhase::Starting,
            1 => LifecyclePhase::Running,
            2 => LifecyclePhase::Stopping,
            _ => LifecyclePhase::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free holder of the current [`LifecyclePhase`]. Clones observe the same phase.
///
/// Only the owner of the lifecycle should call [`advance`](PhaseCell::advance); everyone else
/// reads. Advancing is a `fetch_max`, so racing writers can never move the phase backwards.
#[derive(Clone, Debug, Default)]
pub struct PhaseCell {
    inner: Arc<AtomicU8>,
}

impl PhaseCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LifecyclePhase {
        LifecyclePhase::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Move to `next`. Returns false and leaves the phase untouched if `next` is not
    /// strictly ahead of the current phase.
    pub fn advance(&self, next: LifecyclePhase) -> bool {
        let previous = self.inner.fetch_max(next as u8, Ordering::AcqRel);
        previous < next as u8
    }

    pub fn is_running(&self) -> bool {
        self.get() == LifecyclePhase::Running
    }
}
