//! Pipeline entry point: one run per input file.
//!
//! A run is strictly sequential: load, resolve the hemisphere, ensure the
//! schema, upsert cells, join and upsert forecasts, refresh the latest view,
//! then upsert metadata. Each run owns its own session; concurrent runs only
//! rely on the store's unique keys.

use bytes::Bytes;
use icenet_common::{Hemisphere, HemisphereTables, Identifier, FORECAST_META_TABLE};
use metrics::{counter, histogram};
use netcdf_parser::GriddedDataset;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use storage::{
    ensure_schema, BatchedUpsert, CellTarget, Connector, ForecastMetaRow, ForecastTarget, Grants,
    ResilientSession, UpsertReport,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::IngestionConfig;
use crate::error::Result;
use crate::geometry::build_cells;
use crate::join::join_cells;
use crate::loader::{self, LoadedForecast};
use crate::maintainer::Maintainer;

/// What one successful run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub hemisphere: Hemisphere,
    pub cells: UpsertReport,
    pub forecasts: UpsertReport,
    /// Samples dropped for missing or non-positive values
    pub samples_dropped: usize,
    /// Samples with no matching cell
    pub join_mismatches: usize,
    pub metadata: Vec<ForecastMetaRow>,
}

/// Runs forecast files against one store.
pub struct Pipeline {
    connector: Arc<dyn Connector>,
    config: IngestionConfig,
    grants: Grants,
    upsert: BatchedUpsert,
    /// Table sets for both hemispheres
    tables: Vec<HemisphereTables>,
}

impl Pipeline {
    /// Validate the configuration and every table, view and role identifier
    /// before any file is read.
    pub fn new(connector: Arc<dyn Connector>, config: IngestionConfig) -> Result<Self> {
        config.validate()?;
        let grants = config.grants()?;
        let upsert = BatchedUpsert::new(config.batch_size)?;
        let tables = HemisphereTables::all()?;
        Identifier::new(FORECAST_META_TABLE)?;
        Ok(Self {
            connector,
            config,
            grants,
            upsert,
            tables,
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn tables(&self) -> &[HemisphereTables] {
        &self.tables
    }

    fn tables_for(&self, hemisphere: Hemisphere) -> Result<HemisphereTables> {
        match self.tables.iter().find(|t| t.hemisphere == hemisphere) {
            Some(tables) => Ok(tables.clone()),
            None => Ok(HemisphereTables::for_hemisphere(hemisphere)?),
        }
    }

    /// Decode a NetCDF buffer and ingest it.
    #[instrument(skip_all, fields(source = %name, bytes = data.len()))]
    pub async fn process(&self, data: Bytes, name: &str) -> Result<RunSummary> {
        self.observe(name, async {
            let dataset = loader::decode(data).await?;
            self.ingest(dataset, name).await
        })
        .await
    }

    /// Ingest an already decoded dataset.
    #[instrument(skip_all, fields(source = %name))]
    pub async fn process_dataset(&self, dataset: GriddedDataset, name: &str) -> Result<RunSummary> {
        self.observe(name, self.ingest(dataset, name)).await
    }

    async fn observe(&self, name: &str, run: impl Future<Output = Result<RunSummary>>) -> Result<RunSummary> {
        let started = Instant::now();
        let result = run.await;
        let elapsed = started.elapsed().as_secs_f64();
        histogram!("icenet_run_duration_seconds").record(elapsed);

        match &result {
            Ok(summary) => {
                counter!("icenet_runs_total", "outcome" => "success").increment(1);
                info!(
                    source = %name,
                    hemisphere = %summary.hemisphere,
                    cells_inserted = summary.cells.rows_affected,
                    forecasts_inserted = summary.forecasts.rows_affected,
                    join_mismatches = summary.join_mismatches,
                    elapsed_secs = elapsed,
                    "Ingestion complete"
                );
            }
            Err(e) => {
                counter!("icenet_runs_total", "outcome" => e.kind()).increment(1);
                error!(source = %name, error = %e, elapsed_secs = elapsed, "Ingestion failed");
            }
        }
        result
    }

    async fn ingest(&self, dataset: GriddedDataset, name: &str) -> Result<RunSummary> {
        let loaded = loader::load(dataset)?;
        let tables = self.tables_for(loaded.hemisphere)?;
        debug!(hemisphere = %tables.hemisphere, crs = %tables.projection, "Selected table set");

        let mut session = ResilientSession::new(Arc::clone(&self.connector), self.config.retry)
            .with_context(name);
        let result = self.write(&mut session, &loaded, &tables).await;

        if let Err(e) = session.close().await {
            warn!(source = %name, error = %e, "Failed to close store connection");
        }
        result
    }

    async fn write(
        &self,
        session: &mut ResilientSession,
        loaded: &LoadedForecast,
        tables: &HemisphereTables,
    ) -> Result<RunSummary> {
        session
            .execute_and_commit(&ensure_schema(tables, &self.grants)?)
            .await?;

        let cells = build_cells(&loaded.x_m, &loaded.y_m)?;
        let cell_report = self.upsert.run(session, &CellTarget::new(tables), &cells).await?;
        drop(cells);

        let keys = session.load_cells(&tables.cell_table).await?;
        let joined = join_cells(&loaded.samples, &keys);
        let forecast_report = self
            .upsert
            .run(session, &ForecastTarget::new(tables), &joined.rows)
            .await?;

        let maintainer = Maintainer::new(tables.clone(), self.grants.clone())?;
        maintainer.refresh_view(session).await?;
        let metadata = maintainer
            .update_metadata(session, &self.upsert, &loaded.generated_dates)
            .await?;

        Ok(RunSummary {
            hemisphere: loaded.hemisphere,
            cells: cell_report,
            forecasts: forecast_report,
            samples_dropped: loaded.dropped,
            join_mismatches: joined.mismatches.len(),
            metadata,
        })
    }
}
