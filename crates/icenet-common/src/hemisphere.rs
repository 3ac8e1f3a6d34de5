//! Hemisphere selection and the per-hemisphere table set.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crs::CrsCode;
use crate::error::CommonResult;
use crate::identifier::Identifier;

/// Polar domain a forecast belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    pub const ALL: [Hemisphere; 2] = [Hemisphere::North, Hemisphere::South];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hemisphere::North => "north",
            Hemisphere::South => "south",
        }
    }

    /// Equal-area projection the hemisphere's grid is defined in.
    pub fn projection(&self) -> CrsCode {
        match self {
            Hemisphere::North => CrsCode::Epsg6931,
            Hemisphere::South => CrsCode::Epsg6932,
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that varies by hemisphere, selected once after resolution and
/// passed explicitly to every later step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HemisphereTables {
    pub hemisphere: Hemisphere,
    /// Grid cell geometries (`<hemisphere>_cell`)
    pub cell_table: Identifier,
    /// Forecast records (`<hemisphere>_forecast`)
    pub forecast_table: Identifier,
    /// Materialized latest-forecast view (`<hemisphere>_forecast_latest`)
    pub latest_view: Identifier,
    /// Native projection of `geom_native`
    pub projection: CrsCode,
}

impl HemisphereTables {
    /// Build the fixed table set for a hemisphere.
    pub fn for_hemisphere(hemisphere: Hemisphere) -> CommonResult<Self> {
        let prefix = hemisphere.as_str();
        Ok(Self {
            hemisphere,
            cell_table: Identifier::new(format!("{prefix}_cell"))?,
            forecast_table: Identifier::new(format!("{prefix}_forecast"))?,
            latest_view: Identifier::new(format!("{prefix}_forecast_latest"))?,
            projection: hemisphere.projection(),
        })
    }

    /// Build and validate the table sets for both hemispheres.
    ///
    /// Called at startup so that a bad identifier fails before any file is read.
    pub fn all() -> CommonResult<Vec<Self>> {
        Hemisphere::ALL
            .iter()
            .map(|h| Self::for_hemisphere(*h))
            .collect()
    }
}

/// Name of the metadata table shared by both hemispheres.
pub const FORECAST_META_TABLE: &str = "forecast_meta";
