pub(crate) const METRIC_SHUTDOWN_STEP_RESULT: &str = "lifecycle_shutdown_step_total";
pub(crate) const METRIC_SHUTDOWN_STEP_DURATION: &str = "lifecycle_shutdown_step_duration_seconds";
pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";
pub(crate) const METRIC_TASK_STOP_RESULT: &str = "lifecycle_task_stop_total";

pub(crate) fn emit_step_result(service_name: &str, step: &str, result: &str, duration_secs: f64) {
    metrics::counter!(
        METRIC_SHUTDOWN_STEP_RESULT,
        "service_name" => service_name.to_string(),
        "step" => step.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
    metrics::histogram!(
        METRIC_SHUTDOWN_STEP_DURATION,
        "service_name" => service_name.to_string(),
        "step" => step.to_string()
    )
    .record(duration_secs);
}

pub(crate) fn emit_shutdown_completed(service_name: &str, clean: bool) {
    metrics::counter!(
        METRIC_SHUTDOWN_COMPLETED,
        "service_name" => service_name.to_string(),
        "clean" => clean.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_task_stopped(task: &str, exit: &str) {
    metrics::counter!(
        METRIC_TASK_STOP_RESULT,
        "task" => task.to_string(),
        "exit" => exit.to_string()
    )
    .increment(1);
}
