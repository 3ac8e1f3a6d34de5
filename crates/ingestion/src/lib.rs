//! Sea-ice forecast ingestion library.
//!
//! Incrementally materializes gridded sea-ice concentration forecasts into a
//! PostGIS store keyed by hemisphere.
//!
//! # Architecture
//!
//! This crate is used by the `ingester` service. Per input file it handles:
//!
//! - Decoding and hemisphere resolution
//! - Grid cell geometry in the hemisphere's native projection
//! - Idempotent batched upserts of cells and forecasts
//! - Joining forecasts onto stored cell identifiers
//! - Refreshing the latest-forecast view and the metadata table

pub mod config;
pub mod error;
pub mod geometry;
pub mod hemisphere;
pub mod join;
pub mod loader;
pub mod maintainer;
mod pipeline;

// Re-exports
pub use config::{IngestionConfig, DEFAULT_BATCH_SIZE};
pub use error::{IngestionError, Result};
pub use geometry::build_cells;
pub use hemisphere::{resolve_hemisphere, HemisphereSignals};
pub use join::{join_cells, JoinOutcome};
pub use loader::{ForecastSample, LoadedForecast};
pub use maintainer::Maintainer;
pub use pipeline::{Pipeline, RunSummary};
