//! Resilient database session.
//!
//! A [`ResilientSession`] owns at most one live connection for the duration of
//! a pipeline run. The connection is opened on first use, thrown away after any
//! failure and reopened on the next attempt. Each operation runs inside a
//! bounded retry loop with exponential backoff.

use async_trait::async_trait;
use chrono::NaiveDate;
use icenet_common::Identifier;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::schema::{CellKey, ForecastSummary};
use crate::statement::Statement;

/// One open connection to a store.
#[async_trait]
pub trait StoreConnection: Send {
    /// Execute a statement and commit it. Returns the affected row count.
    async fn execute(&mut self, statement: &Statement) -> StorageResult<u64>;

    /// All `(cell_id, centroid_x, centroid_y)` rows of a cell table.
    async fn load_cells(&mut self, table: &Identifier) -> StorageResult<Vec<CellKey>>;

    /// Date range and count of the forecasts stored for one generation date.
    async fn forecast_summary(
        &mut self,
        table: &Identifier,
        generated: NaiveDate,
    ) -> StorageResult<Option<ForecastSummary>>;

    /// Close gracefully.
    async fn close(self: Box<Self>) -> StorageResult<()>;
}

/// Opens connections to a store.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> StorageResult<Box<dyn StoreConnection>>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// Retry budget and backoff for store operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base in seconds; retry `n` sleeps `base * e^n`
    pub base_delay_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_secs: f64) -> StorageResult<Self> {
        let policy = Self {
            max_retries,
            base_delay_secs,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if !self.base_delay_secs.is_finite() || self.base_delay_secs < 0.0 {
            return Err(StorageError::InvalidConfig(format!(
                "retry base delay must be a non-negative number of seconds, got {}",
                self.base_delay_secs
            )));
        }
        Ok(())
    }

    /// Sleep before retry number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.base_delay_secs * f64::from(attempt).exp();
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Runs `$call` with a live connection bound to `$conn`, retrying transient
/// failures per the session's policy. Other failures are returned at once.
macro_rules! with_retry {
    ($session:ident, $operation:expr, |$conn:ident| $call:expr) => {{
        let operation = $operation;
        let mut attempt: u32 = 0;
        loop {
            let result = match $session.connection().await {
                Ok($conn) => $call.await,
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => break Ok(value),
                Err(error) => {
                    attempt += 1;
                    $session.discard_connection();

                    if !error.is_transient() {
                        warn!(
                            context = %$session.context,
                            operation = %operation,
                            error = %error,
                            "Store operation failed permanently, not retrying"
                        );
                        break Err(error);
                    }
                    if attempt > $session.policy.max_retries {
                        break Err(StorageError::RetriesExhausted {
                            operation,
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }

                    let delay = $session.policy.delay_for(attempt);
                    counter!("icenet_store_retries_total").increment(1);
                    warn!(
                        context = %$session.context,
                        operation = %operation,
                        retry = attempt,
                        max_retries = $session.policy.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "Store operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }};
}

/// A lazily connected, self-healing session scoped to one run.
pub struct ResilientSession {
    connector: Arc<dyn Connector>,
    connection: Option<Box<dyn StoreConnection>>,
    policy: RetryPolicy,
    context: String,
}

impl ResilientSession {
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            connection: None,
            policy,
            context: String::new(),
        }
    }

    /// Tag log lines with the run they belong to (typically the file name).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn connection(&mut self) -> StorageResult<&mut Box<dyn StoreConnection>> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                debug!(context = %self.context, store = %self.connector.describe(), "Opening store connection");
                self.connector.connect().await?
            }
        };
        Ok(self.connection.insert(connection))
    }

    fn discard_connection(&mut self) {
        self.connection = None;
    }

    /// Execute and commit a statement, retrying transient failures.
    pub async fn execute_and_commit(&mut self, statement: &Statement) -> StorageResult<u64> {
        with_retry!(self, statement.label(), |conn| conn.execute(statement))
    }

    pub async fn load_cells(&mut self, table: &Identifier) -> StorageResult<Vec<CellKey>> {
        with_retry!(self, format!("load cells from {table}"), |conn| conn.load_cells(table))
    }

    pub async fn forecast_summary(
        &mut self,
        table: &Identifier,
        generated: NaiveDate,
    ) -> StorageResult<Option<ForecastSummary>> {
        with_retry!(
            self,
            format!("summarise {table} for {generated}"),
            |conn| conn.forecast_summary(table, generated)
        )
    }

    /// Close the connection, if any. Dropping the session also releases it.
    pub async fn close(mut self) -> StorageResult<()> {
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay_secs, 1.0);
    }

    #[test]
    fn test_delays_grow_exponentially() {
        let policy = RetryPolicy::new(5, 1.0).unwrap();
        let delays: Vec<Duration> = (1..=5).map(|n| policy.delay_for(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
        assert_approx_eq!(delays[0].as_secs_f64(), std::f64::consts::E, 1e-6);
        assert_approx_eq!(delays[1].as_secs_f64(), std::f64::consts::E.powi(2), 1e-6);
    }

    #[test]
    fn test_zero_base_means_no_sleep() {
        let policy = RetryPolicy::new(3, 0.0).unwrap();
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_invalid_base_delay() {
        assert!(RetryPolicy::new(5, -1.0).is_err());
        assert!(RetryPolicy::new(5, f64::NAN).is_err());
    }
}
