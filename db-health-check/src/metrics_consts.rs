pub const PROBE_EXECUTIONS: &str = "db_probe_executions_total";
pub const PROBE_DURATION: &str = "db_probe_duration_seconds";
pub const PROBE_UP: &str = "db_probe_up";
pub const PROBE_LAST_SUCCESS: &str = "db_probe_last_success_timestamp_seconds";
pub const SCHEDULER_PANICS: &str = "db_probe_scheduler_panics_total";

pub const READINESS_CHECKS: &str = "db_readiness_checks_total";

pub const METRICS_PUSHES: &str = "metrics_push_total";

pub const HTTP_REQUESTS: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_requests_duration_seconds";
