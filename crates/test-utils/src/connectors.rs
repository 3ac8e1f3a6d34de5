//! Fault-injecting store connectors.
//!
//! [`FlakyConnector`] wraps a [`MemoryStore`] and fails the first `k` times a
//! chosen point (connect, execute or read) is reached, recording the instant of
//! every attempt so backoff timing can be asserted under a paused clock.

use async_trait::async_trait;
use chrono::NaiveDate;
use icenet_common::Identifier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storage::{
    CellKey, Connector, ForecastSummary, MemoryStore, Statement, StorageError, StorageResult, StoreConnection,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Where injected failures occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Connect,
    Execute,
    /// `load_cells` and `forecast_summary`
    Read,
}

#[derive(Debug)]
struct Shared {
    failures_remaining: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
}

impl Shared {
    async fn attempt(&self) -> StorageResult<()> {
        self.attempts.lock().await.push(Instant::now());
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Err(StorageError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Connector that fails a fixed number of times before delegating.
#[derive(Debug, Clone)]
pub struct FlakyConnector {
    inner: MemoryStore,
    point: FailurePoint,
    shared: Arc<Shared>,
}

impl FlakyConnector {
    pub fn failing_first(inner: MemoryStore, failures: usize, point: FailurePoint) -> Self {
        Self {
            inner,
            point,
            shared: Arc::new(Shared {
                failures_remaining: AtomicUsize::new(failures),
                attempts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Never succeeds at `point`.
    pub fn always_failing(inner: MemoryStore, point: FailurePoint) -> Self {
        Self::failing_first(inner, usize::MAX, point)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.inner
    }

    /// Times the failure point was reached, failed or not.
    pub async fn attempt_count(&self) -> usize {
        self.shared.attempts.lock().await.len()
    }

    pub async fn attempt_instants(&self) -> Vec<Instant> {
        self.shared.attempts.lock().await.clone()
    }
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> StorageResult<Box<dyn StoreConnection>> {
        if self.point == FailurePoint::Connect {
            self.shared.attempt().await?;
        }
        let inner = self.inner.connect().await?;
        Ok(Box::new(FlakyConnection {
            inner,
            point: self.point,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn describe(&self) -> String {
        format!("flaky({})", self.inner.describe())
    }
}

struct FlakyConnection {
    inner: Box<dyn StoreConnection>,
    point: FailurePoint,
    shared: Arc<Shared>,
}

impl FlakyConnection {
    async fn reach(&self, point: FailurePoint) -> StorageResult<()> {
        if self.point == point {
            self.shared.attempt().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreConnection for FlakyConnection {
    async fn execute(&mut self, statement: &Statement) -> StorageResult<u64> {
        self.reach(FailurePoint::Execute).await?;
        self.inner.execute(statement).await
    }

    async fn load_cells(&mut self, table: &Identifier) -> StorageResult<Vec<CellKey>> {
        self.reach(FailurePoint::Read).await?;
        self.inner.load_cells(table).await
    }

    async fn forecast_summary(
        &mut self,
        table: &Identifier,
        generated: NaiveDate,
    ) -> StorageResult<Option<ForecastSummary>> {
        self.reach(FailurePoint::Read).await?;
        self.inner.forecast_summary(table, generated).await
    }

    async fn close(self: Box<Self>) -> StorageResult<()> {
        self.inner.close().await
    }
}
