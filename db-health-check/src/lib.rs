pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod metrics_consts;
pub mod pool;
pub mod probe;
pub mod push;
pub mod readiness;
pub mod scheduler;
