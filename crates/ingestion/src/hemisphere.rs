//! Hemisphere resolution from file-level attributes.

use icenet_common::Hemisphere;
use netcdf_parser::GriddedDataset;

use crate::error::{IngestionError, Result};

/// Latitude beyond which a grid's extent settles the hemisphere.
const POLAR_LATITUDE: f64 = 80.0;

/// The attributes that can identify a hemisphere. All are optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HemisphereSignals {
    pub lat_max: Option<f64>,
    pub lat_min: Option<f64>,
    pub keywords: Option<String>,
}

impl HemisphereSignals {
    /// Read `geospatial_lat_max`, `geospatial_lat_min` and `keywords`.
    /// Latitudes that are not numeric count as absent.
    pub fn from_dataset(dataset: &GriddedDataset) -> Self {
        Self {
            lat_max: dataset.attribute("geospatial_lat_max").and_then(|v| v.as_f64()),
            lat_min: dataset.attribute("geospatial_lat_min").and_then(|v| v.as_f64()),
            keywords: dataset
                .attribute("keywords")
                .and_then(|v| v.as_text())
                .map(str::to_string),
        }
    }

    /// Latitude extent first, then keywords that name exactly one hemisphere.
    pub fn resolve(&self) -> Result<Hemisphere> {
        if self.lat_max.is_some_and(|lat| lat > POLAR_LATITUDE) {
            return Ok(Hemisphere::North);
        }
        if self.lat_min.is_some_and(|lat| lat < -POLAR_LATITUDE) {
            return Ok(Hemisphere::South);
        }

        if let Some(keywords) = &self.keywords {
            let keywords = keywords.to_lowercase();
            match (keywords.contains("north"), keywords.contains("south")) {
                (true, false) => return Ok(Hemisphere::North),
                (false, true) => return Ok(Hemisphere::South),
                _ => {}
            }
        }

        Err(IngestionError::HemisphereUndetermined {
            lat_max: self.lat_max,
            lat_min: self.lat_min,
            keywords: self.keywords.clone(),
        })
    }
}

pub fn resolve_hemisphere(dataset: &GriddedDataset) -> Result<Hemisphere> {
    HemisphereSignals::from_dataset(dataset).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(lat_max: Option<f64>, lat_min: Option<f64>, keywords: Option<&str>) -> HemisphereSignals {
        HemisphereSignals {
            lat_max,
            lat_min,
            keywords: keywords.map(str::to_string),
        }
    }

    #[test]
    fn test_latitude_extent() {
        assert_eq!(signals(Some(85.0), None, None).resolve().unwrap(), Hemisphere::North);
        assert_eq!(signals(None, Some(-85.0), None).resolve().unwrap(), Hemisphere::South);
        assert_eq!(signals(Some(90.0), Some(-90.0), None).resolve().unwrap(), Hemisphere::North);
    }

    #[test]
    fn test_latitude_takes_precedence_over_keywords() {
        let s = signals(None, Some(-89.0), Some("Arctic, Northern Hemisphere"));
        assert_eq!(s.resolve().unwrap(), Hemisphere::South);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(signals(None, None, Some("Southern Ocean")).resolve().unwrap(), Hemisphere::South);
        assert_eq!(signals(Some(45.0), None, Some("NORTH pole")).resolve().unwrap(), Hemisphere::North);
    }

    #[test]
    fn test_ambiguous_keywords_are_undetermined() {
        let err = signals(None, None, Some("north and south")).resolve().unwrap_err();
        assert!(matches!(err, IngestionError::HemisphereUndetermined { .. }));
    }

    #[test]
    fn test_no_signal_is_undetermined() {
        let err = signals(Some(80.0), Some(-80.0), None).resolve().unwrap_err();
        match err {
            IngestionError::HemisphereUndetermined { lat_max, lat_min, keywords } => {
                assert_eq!(lat_max, Some(80.0));
                assert_eq!(lat_min, Some(-80.0));
                assert!(keywords.is_none());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_reads_dataset_attributes() {
        let dataset = GriddedDataset::new()
            .with_attribute("geospatial_lat_max", "-40.5")
            .with_attribute("geospatial_lat_min", -90.0)
            .with_attribute("keywords", "Sea Ice, Antarctic");

        let signals = HemisphereSignals::from_dataset(&dataset);
        assert_eq!(signals.lat_max, Some(-40.5));
        assert_eq!(resolve_hemisphere(&dataset).unwrap(), Hemisphere::South);
    }

    #[test]
    fn test_non_numeric_latitude_is_absent() {
        let dataset = GriddedDataset::new()
            .with_attribute("geospatial_lat_max", "far north")
            .with_attribute("keywords", "northern hemisphere");

        assert_eq!(HemisphereSignals::from_dataset(&dataset).lat_max, None);
        assert_eq!(resolve_hemisphere(&dataset).unwrap(), Hemisphere::North);
    }
}
