//! Persistence for sea-ice forecasts.
//!
//! Provides:
//! - A resilient, lazily connected session with bounded retries
//! - PostgreSQL/PostGIS and in-memory backends behind one connection trait
//! - A batched, idempotent upsert engine
//! - The forecast schema (row types, upsert targets, DDL)

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod session;
pub mod statement;
pub mod upsert;

pub use config::{DatabaseConfig, SslMode};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStore, Row, Value};
pub use postgres::PgConnector;
pub use schema::{
    CellKey, CellRow, CellTarget, ForecastMetaRow, ForecastMetaTarget, ForecastRow, ForecastSummary,
    ForecastTarget, Grants,
};
pub use schema::{ensure_schema, refresh_latest_view};
pub use session::{Connector, ResilientSession, RetryPolicy, StoreConnection};
pub use statement::{ColumnData, ColumnValues, InsertBatch, OnConflict, Statement, TransformedColumn};
pub use upsert::{BatchedUpsert, UpsertReport, UpsertTarget};
