use std::io;

use thiserror::Error;

/// Invalid configuration. The only error allowed to abort the process, and only at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration from env: {0}")]
    Env(#[from] envconfig::Error),
    #[error("invalid DB_QUERY: query is empty")]
    EmptyQuery,
    #[error("invalid DB_QUERY: {len} characters exceeds the {max} character limit")]
    QueryTooLong { len: usize, max: usize },
    #[error("invalid DB_QUERY: must be a single statement without ';'")]
    QueryHasSeparator,
    #[error("invalid {0}: must be greater than zero")]
    ZeroValue(&'static str),
    #[error("invalid DB_URL: {0}")]
    InvalidDatabaseUrl(#[source] sqlx::Error),
    #[error("invalid METRICS_PUSHGATEWAY_URL: {0}")]
    InvalidPushUrl(#[from] url::ParseError),
    #[error("invalid METRICS_PUSHGATEWAY_URL: {0} must be an http(s) URL")]
    UnsupportedPushUrl(String),
}

/// A single probe attempt failed. Always folded into a failed `ProbeOutcome`, never propagated.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to acquire a connection: {0}")]
    Acquire(#[source] sqlx::Error),
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("query returned no rows")]
    NoRows,
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A listener could not bind. The listener is skipped, the rest of the process keeps starting.
#[derive(Error, Debug)]
#[error("failed to bind {name} listener on {bind}: {source}")]
pub struct ListenerError {
    pub name: &'static str,
    pub bind: String,
    #[source]
    pub source: io::Error,
}

/// A metrics push to a file or a remote collector failed. Logged; the push timer keeps going.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("failed to write metrics file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to push metrics to gateway: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected metrics push with status {0}")]
    Status(reqwest::StatusCode),
}
