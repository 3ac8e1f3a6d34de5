//! Error types for the ingestion crate.

use icenet_common::CommonError;
use netcdf_parser::NetCdfError;
use storage::StorageError;
use thiserror::Error;

/// Errors that end a pipeline run.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The buffer is not a usable gridded forecast
    #[error("Failed to decode dataset: {0}")]
    Decode(String),

    #[error(
        "Cannot determine hemisphere (geospatial_lat_max={lat_max:?}, \
         geospatial_lat_min={lat_min:?}, keywords={keywords:?})"
    )]
    HemisphereUndetermined {
        lat_max: Option<f64>,
        lat_min: Option<f64>,
        keywords: Option<String>,
    },

    /// Store writes or reads failed after all retries
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Identifier(#[from] CommonError),
}

impl From<NetCdfError> for IngestionError {
    fn from(err: NetCdfError) -> Self {
        IngestionError::Decode(err.to_string())
    }
}

impl IngestionError {
    /// Short label used for the outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestionError::Decode(_) | IngestionError::Task(_) => "decode",
            IngestionError::HemisphereUndetermined { .. } => "hemisphere_undetermined",
            IngestionError::Persistence(_) => "persistence",
            IngestionError::InvalidGrid(_) => "invalid_grid",
            IngestionError::InvalidConfig(_) | IngestionError::Identifier(_) => "invalid_config",
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
