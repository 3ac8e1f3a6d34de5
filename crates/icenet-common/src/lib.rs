//! Common types and utilities shared across the sea-ice forecast ingestion crates.

pub mod crs;
pub mod error;
pub mod hemisphere;
pub mod identifier;
pub mod progress;

pub use crs::CrsCode;
pub use error::{CommonError, CommonResult};
pub use hemisphere::{Hemisphere, HemisphereTables, FORECAST_META_TABLE};
pub use identifier::Identifier;
pub use progress::{human_readable, Progress, ProgressSnapshot};
