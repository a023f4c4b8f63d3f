use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, error, info, warn};

use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// Result of one completed probe. Replaced wholesale, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub observed_at: DateTime<Utc>,
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn succeeded(detail: Option<String>) -> Self {
        Self {
            success: true,
            observed_at: Utc::now(),
            detail,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            observed_at: Utc::now(),
            detail: Some(detail.into()),
        }
    }

    /// Placeholder held until the first scheduled probe completes.
    pub fn pending() -> Self {
        Self::failed("no probe has completed yet")
    }
}

/// Runs the configured query against the backing store.
///
/// Implementations never return an error or panic for database faults: every acquisition,
/// execution or driver failure becomes a failed outcome (or `false`). No retries happen here.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// Run the query once with no timeout override. Succeeds iff at least one row comes back.
    async fn execute(&self) -> ProbeOutcome;

    /// Run the query under an explicit statement timeout, discarding the rows. The whole call,
    /// including waiting for a connection, is bounded by `timeout`.
    async fn ping(&self, timeout: Duration) -> bool;

    /// Release the connection pool. Probes issued afterwards fail.
    async fn close(&self);
}

pub struct PgProbeClient {
    pool: PgPool,
    config: ProbeConfig,
}

impl PgProbeClient {
    pub fn new(pool: PgPool, config: ProbeConfig) -> Self {
        Self { pool, config }
    }

    async fn run_query(&self) -> Result<Option<i64>, ProbeError> {
        let mut conn = self.pool.acquire().await.map_err(ProbeError::Acquire)?;
        let row = sqlx::query(self.config.query())
            .fetch_optional(&mut *conn)
            .await
            .map_err(ProbeError::Query)?
            .ok_or(ProbeError::NoRows)?;

        Ok(first_integer(&row))
    }

    async fn run_bounded(&self, timeout: Duration) -> Result<(), ProbeError> {
        // SET LOCAL scopes the timeout to this transaction, which is rolled back when dropped.
        let mut tx = self.pool.begin().await.map_err(ProbeError::Acquire)?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(ProbeError::Query)?;

        sqlx::query(self.config.query())
            .fetch_optional(&mut *tx)
            .await
            .map_err(ProbeError::Query)?
            .map(|_| ())
            .ok_or(ProbeError::NoRows)
    }
}

#[async_trait]
impl ProbeClient for PgProbeClient {
    async fn execute(&self) -> ProbeOutcome {
        debug!(query = %self.config.query(), "executing probe query");

        match self.run_query().await {
            Ok(value) => {
                info!(result = ?value, "probe query executed successfully");
                ProbeOutcome::succeeded(value.map(|v| format!("result: {v}")))
            }
            Err(ProbeError::NoRows) => {
                warn!("probe query executed but returned no rows");
                ProbeOutcome::failed(ProbeError::NoRows.to_string())
            }
            Err(e) => {
                error!(error = %e, "failed to execute probe query");
                ProbeOutcome::failed(e.to_string())
            }
        }
    }

    async fn ping(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.run_bounded(timeout)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "ping failed");
                false
            }
            Err(_) => {
                debug!(error = %ProbeError::Timeout(timeout), "ping failed");
                false
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("connection pool closed");
    }
}

fn first_integer(row: &PgRow) -> Option<i64> {
    if row.is_empty() {
        return None;
    }
    row.try_get::<i64, _>(0)
        .ok()
        .or_else(|| row.try_get::<i32, _>(0).ok().map(i64::from))
}
