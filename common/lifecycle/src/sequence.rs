//! Ordered, fault-tolerant shutdown.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::metrics;

type StepFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

struct Step {
    name: String,
    timeout: Duration,
    run: StepFn,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepResult {
    Completed,
    Failed(String),
    TimedOut,
    Panicked,
}

impl StepResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Completed => "completed",
            StepResult::Failed(_) => "failed",
            StepResult::TimedOut => "timeout",
            StepResult::Panicked => "panicked",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StepReport {
    pub name: String,
    pub result: StepResult,
    pub timeout: Duration,
    pub duration: Duration,
}

impl StepReport {
    fn error(&self) -> Option<LifecycleError> {
        match &self.result {
            StepResult::Completed => None,
            StepResult::Failed(reason) => Some(LifecycleError::StepFailed {
                step: self.name.clone(),
                reason: reason.clone(),
            }),
            StepResult::TimedOut => Some(LifecycleError::StepTimedOut {
                step: self.name.clone(),
                timeout: self.timeout,
            }),
            StepResult::Panicked => Some(LifecycleError::StepPanicked {
                step: self.name.clone(),
            }),
        }
    }
}

/// Outcome of [`ShutdownSequence::run`], one entry per step in execution order.
#[derive(Clone, Debug, Default)]
pub struct ShutdownReport {
    pub steps: Vec<StepReport>,
    pub total: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.result == StepResult::Completed)
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn errors(&self) -> Vec<LifecycleError> {
        self.steps.iter().filter_map(StepReport::error).collect()
    }

    /// First failing step as an error, if any.
    pub fn into_result(self) -> Result<(), LifecycleError> {
        match self.steps.iter().find_map(StepReport::error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A list of named release steps, executed strictly in registration order.
///
/// Each step runs on its own task under its own timeout. A step that fails, panics or runs out
/// of time is recorded and abandoned, and the next step starts anyway: the sequence always
/// reaches its end.
pub struct ShutdownSequence {
    service: String,
    steps: Vec<Step>,
}

impl ShutdownSequence {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn step<F, Fut>(mut self, name: &str, timeout: Duration, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.steps.push(Step {
            name: name.to_string(),
            timeout,
            run: Box::new(move || run().boxed()),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(self) -> ShutdownReport {
        let started = Instant::now();
        let mut report = ShutdownReport::default();

        for step in self.steps {
            let step_started = Instant::now();
            let mut join = tokio::spawn((step.run)());

            let result = match tokio::time::timeout(step.timeout, &mut join).await {
                Ok(Ok(Ok(()))) => StepResult::Completed,
                Ok(Ok(Err(reason))) => StepResult::Failed(reason),
                Ok(Err(e)) if e.is_panic() => StepResult::Panicked,
                Ok(Err(e)) => StepResult::Failed(e.to_string()),
                Err(_) => {
                    join.abort();
                    StepResult::TimedOut
                }
            };

            let duration = step_started.elapsed();
            metrics::emit_step_result(
                &self.service,
                &step.name,
                result.as_str(),
                duration.as_secs_f64(),
            );
            match &result {
                StepResult::Completed => info!(
                    step = %step.name,
                    duration_secs = duration.as_secs_f64(),
                    "shutdown step completed"
                ),
                StepResult::Failed(reason) => warn!(
                    step = %step.name,
                    duration_secs = duration.as_secs_f64(),
                    "shutdown step failed: {reason}"
                ),
                other => warn!(
                    step = %step.name,
                    duration_secs = duration.as_secs_f64(),
                    result = other.as_str(),
                    "shutdown step did not finish cleanly"
                ),
            }

            report.steps.push(StepReport {
                name: step.name,
                result,
                timeout: step.timeout,
                duration,
            });
        }

        report.total = started.elapsed();
        let clean = report.is_clean();
        metrics::emit_shutdown_completed(&self.service, clean);
        if clean {
            info!(
                service = %self.service,
                total_duration_secs = report.total.as_secs_f64(),
                "shutdown complete"
            );
        } else {
            warn!(
                service = %self.service,
                total_duration_secs = report.total.as_secs_f64(),
                failed_steps = report.errors().len(),
                "shutdown complete with failures"
            );
        }
        report
    }
}
