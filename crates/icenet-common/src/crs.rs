//! Coordinate Reference System codes used by the forecast tables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known CRS codes used when persisting cell geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// WGS 84 / NSIDC EASE-Grid 2.0 North (Lambert Azimuthal Equal Area)
    Epsg6931,
    /// WGS 84 / NSIDC EASE-Grid 2.0 South (Lambert Azimuthal Equal Area)
    Epsg6932,
}

impl CrsCode {
    /// Numeric SRID as understood by PostGIS.
    pub fn srid(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg6931 => 6931,
            CrsCode::Epsg6932 => 6932,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.srid())
    }
}
