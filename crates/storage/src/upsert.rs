//! Batched, idempotent upserts.

use icenet_common::{Identifier, Progress};
use metrics::counter;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::session::ResilientSession;
use crate::statement::{InsertBatch, Statement};

/// A table that records can be upserted into.
pub trait UpsertTarget {
    type Record;

    fn table(&self) -> &Identifier;

    /// Build one insert carrying `records`, with the table's conflict rule.
    fn to_batch(&self, records: &[Self::Record]) -> InsertBatch;
}

/// Outcome of one [`BatchedUpsert::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub batches: usize,
    pub rows_attempted: usize,
    /// Rows the store reports as inserted or updated
    pub rows_affected: u64,
}

/// Splits records into fixed-size chunks and submits them one at a time.
#[derive(Debug, Clone, Copy)]
pub struct BatchedUpsert {
    batch_size: usize,
}

impl BatchedUpsert {
    pub fn new(batch_size: usize) -> StorageResult<Self> {
        if batch_size == 0 {
            return Err(StorageError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches needed for `records` rows.
    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.batch_size)
    }

    /// Upsert `records` in order. Stops at the first batch whose retries are
    /// exhausted; earlier batches stay committed.
    pub async fn run<T: UpsertTarget>(
        &self,
        session: &mut ResilientSession,
        target: &T,
        records: &[T::Record],
    ) -> StorageResult<UpsertReport> {
        let table = target.table().to_string();
        let batches = self.batch_count(records.len());
        let mut progress = Progress::new(records.len());
        let mut report = UpsertReport::default();

        info!(table = %table, rows = records.len(), batches, "Upserting records");

        for (idx, chunk) in records.chunks(self.batch_size).enumerate() {
            debug!(table = %table, batch = idx + 1, batches, rows = chunk.len(), "Submitting batch");

            let statement = Statement::Insert(target.to_batch(chunk));
            let affected = session.execute_and_commit(&statement).await?;

            progress.add(chunk.len());
            report.batches += 1;
            report.rows_attempted += chunk.len();
            report.rows_affected += affected;
            counter!("icenet_rows_submitted_total", "table" => table.clone()).increment(chunk.len() as u64);

            info!(
                table = %table,
                batch = idx + 1,
                batches,
                rows = chunk.len(),
                affected,
                progress = %progress.snapshot(),
                "Batch committed"
            );
        }

        Ok(report)
    }
}
