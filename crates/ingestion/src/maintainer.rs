//! Latest-view refresh and forecast metadata accounting.

use chrono::NaiveDate;
use icenet_common::HemisphereTables;
use storage::{refresh_latest_view, BatchedUpsert, ForecastMetaRow, ForecastMetaTarget, Grants, ResilientSession};
use tracing::{info, warn};

use crate::error::Result;

/// Post-ingestion maintenance for one hemisphere.
#[derive(Debug, Clone)]
pub struct Maintainer {
    tables: HemisphereTables,
    grants: Grants,
    meta: ForecastMetaTarget,
}

impl Maintainer {
    pub fn new(tables: HemisphereTables, grants: Grants) -> Result<Self> {
        Ok(Self {
            tables,
            grants,
            meta: ForecastMetaTarget::new()?,
        })
    }

    /// Create the latest-forecast view if needed and refresh it.
    pub async fn refresh_view(&self, session: &mut ResilientSession) -> Result<()> {
        let statement = refresh_latest_view(&self.tables, &self.grants)?;
        session.execute_and_commit(&statement).await?;
        info!(view = %self.tables.latest_view, "Refreshed latest forecast view");
        Ok(())
    }

    /// Recompute and upsert one metadata row per generation date from what is
    /// stored, replacing any earlier aggregate.
    pub async fn update_metadata(
        &self,
        session: &mut ResilientSession,
        upsert: &BatchedUpsert,
        generated_dates: &[NaiveDate],
    ) -> Result<Vec<ForecastMetaRow>> {
        let mut rows = Vec::with_capacity(generated_dates.len());

        for generated in generated_dates {
            match session.forecast_summary(&self.tables.forecast_table, *generated).await? {
                Some(summary) => rows.push(ForecastMetaRow {
                    date_forecast_generated: *generated,
                    hemisphere: self.tables.hemisphere,
                    date_forecast_first: summary.first,
                    date_forecast_last: summary.last,
                    n_records: summary.n_records,
                }),
                None => warn!(
                    hemisphere = %self.tables.hemisphere,
                    generated = %generated,
                    "No stored forecasts for generation date, skipping metadata"
                ),
            }
        }

        upsert.run(session, &self.meta, &rows).await?;
        for row in &rows {
            info!(
                hemisphere = %row.hemisphere,
                generated = %row.date_forecast_generated,
                first = %row.date_forecast_first,
                last = %row.date_forecast_last,
                n_records = row.n_records,
                "Updated forecast metadata"
            );
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icenet_common::Hemisphere;
    use std::sync::Arc;
    use storage::{ForecastRow, ForecastTarget, MemoryStore, RetryPolicy};
    use test_utils::date;

    fn forecast(day: u32, cell_id: i32) -> ForecastRow {
        ForecastRow {
            date_forecast_generated: date(2024, 1, 1),
            date_forecast_for: date(2024, 1, day),
            cell_id,
            mean: 0.5,
            stddev: 0.1,
        }
    }

    #[tokio::test]
    async fn test_metadata_reflects_stored_aggregate() {
        let store = MemoryStore::new();
        let tables = HemisphereTables::for_hemisphere(Hemisphere::North).unwrap();
        let maintainer = Maintainer::new(tables.clone(), Grants::default()).unwrap();
        let upsert = BatchedUpsert::new(10).unwrap();
        let mut session = ResilientSession::new(Arc::new(store.clone()), RetryPolicy::default());

        let target = ForecastTarget::new(&tables);
        upsert.run(&mut session, &target, &[forecast(2, 1), forecast(3, 1)]).await.unwrap();
        maintainer.update_metadata(&mut session, &upsert, &[date(2024, 1, 1)]).await.unwrap();

        upsert.run(&mut session, &target, &[forecast(4, 1), forecast(2, 2)]).await.unwrap();
        let rows = maintainer.update_metadata(&mut session, &upsert, &[date(2024, 1, 1)]).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].n_records, 4);
        assert_eq!(rows[0].date_forecast_first, date(2024, 1, 2));
        assert_eq!(rows[0].date_forecast_last, date(2024, 1, 4));

        let stored = store.rows("forecast_meta").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["n_records"].as_i64(), Some(4));
        assert_eq!(stored[0]["hemisphere"].as_text(), Some("north"));
    }

    #[tokio::test]
    async fn test_generation_without_records_is_skipped() {
        let store = MemoryStore::new();
        let tables = HemisphereTables::for_hemisphere(Hemisphere::South).unwrap();
        let maintainer = Maintainer::new(tables, Grants::default()).unwrap();
        let mut session = ResilientSession::new(Arc::new(store.clone()), RetryPolicy::default());

        let rows = maintainer
            .update_metadata(&mut session, &BatchedUpsert::new(10).unwrap(), &[date(2024, 1, 1)])
            .await
            .unwrap();

        assert!(rows.is_empty());
        assert_eq!(store.row_count("forecast_meta").await, 0);
    }

    #[tokio::test]
    async fn test_refresh_view_runs_view_script() {
        let store = MemoryStore::new();
        let tables = HemisphereTables::for_hemisphere(Hemisphere::North).unwrap();
        let maintainer = Maintainer::new(tables, Grants::default()).unwrap();
        let mut session = ResilientSession::new(Arc::new(store.clone()), RetryPolicy::default());

        maintainer.refresh_view(&mut session).await.unwrap();

        let scripts = store.executed_scripts().await;
        assert!(scripts[0].starts_with("CREATE MATERIALIZED VIEW IF NOT EXISTS north_forecast_latest"));
        assert_eq!(scripts.last().unwrap(), "REFRESH MATERIALIZED VIEW north_forecast_latest");
    }
}
