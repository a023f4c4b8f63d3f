use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Connection pool settings. The probe only ever holds one connection at a time, but readiness
/// requests share the same pool, so size it for expected concurrent probe traffic.
#[derive(Clone)]
pub struct PoolConfig {
    pub connect_options: PgConnectOptions,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Also the upper bound on a scheduled probe waiting for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Build the pool without connecting. Connections are opened on first use, so the process
/// starts (and answers liveness) while the database is unreachable.
pub fn connect_lazy(config: &PoolConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .test_before_acquire(true)
        .connect_lazy_with(config.connect_options.clone())
}
