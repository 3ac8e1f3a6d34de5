//! Minimal NetCDF reader for gridded forecast datasets.
//!
//! Only what the ingestion pipeline needs is decoded: global attributes,
//! coordinate axes and numeric data variables, unpacked to `f64` with missing
//! entries as NaN. Time axes are interpreted with [`cf_time`].

pub mod cf_time;
pub mod dataset;
pub mod error;
pub mod native;

pub use cf_time::CfTimeUnits;
pub use dataset::{AttributeValue, Dimension, GriddedDataset, Variable};
pub use error::{NetCdfError, NetCdfResult};
pub use native::{read_gridded_from_bytes, read_gridded_from_path, silence_hdf5_errors};
