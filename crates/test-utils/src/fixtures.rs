//! Synthetic forecast datasets.
//!
//! Builds decoded [`GriddedDataset`]s shaped like IceNet daily forecast files:
//! `xc`/`yc` axes in kilometres, a CF-encoded `time` axis, a `leadtime` axis in
//! days, and `sic_mean`/`sic_stddev` over `(time, yc, xc, leadtime)`.
//! Every value not set explicitly is missing (NaN).

use chrono::NaiveDate;
use netcdf_parser::{AttributeValue, Dimension, GriddedDataset, Variable};
use std::collections::BTreeMap;

/// Days-since reference used for the `time` axis.
pub const TIME_UNITS: &str = "days since 1970-01-01 00:00:00";

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}

/// Builder for a synthetic forecast dataset.
#[derive(Debug, Clone)]
pub struct ForecastFixture {
    pub x_km: Vec<f64>,
    pub y_km: Vec<f64>,
    pub generated: Vec<NaiveDate>,
    pub leadtime_days: Vec<u32>,
    x_name: String,
    y_name: String,
    mean_name: String,
    stddev_name: String,
    attributes: Vec<(String, AttributeValue)>,
    /// `(time, leadtime, x, y)` index -> `(mean, stddev)`
    samples: BTreeMap<(usize, usize, usize, usize), (f64, f64)>,
}

impl ForecastFixture {
    /// Empty forecast generated on 2024-01-01 with a single one-day lead time.
    pub fn new(x_km: Vec<f64>, y_km: Vec<f64>) -> Self {
        Self {
            x_km,
            y_km,
            generated: vec![date(2024, 1, 1)],
            leadtime_days: vec![1],
            x_name: "xc".to_string(),
            y_name: "yc".to_string(),
            mean_name: "sic_mean".to_string(),
            stddev_name: "sic_stddev".to_string(),
            attributes: Vec::new(),
            samples: BTreeMap::new(),
        }
    }

    /// 3 x 2 northern grid with one valid sample: mean 0.8 at (0 km, -100 km).
    pub fn north_example() -> Self {
        Self::new(vec![-200.0, 0.0, 200.0], vec![-100.0, 100.0])
            .with_attribute("geospatial_lat_max", 90.0)
            .with_attribute("geospatial_lat_min", 16.6)
            .with_sample(0, 0, 0.0, -100.0, 0.8, 0.05)
    }

    /// Southern counterpart of [`ForecastFixture::north_example`].
    pub fn south_example() -> Self {
        Self::new(vec![-200.0, 0.0, 200.0], vec![-100.0, 100.0])
            .with_attribute("geospatial_lat_max", -39.2)
            .with_attribute("geospatial_lat_min", -90.0)
            .with_sample(0, 0, 0.0, -100.0, 0.6, 0.1)
    }

    pub fn generated_on(mut self, dates: Vec<NaiveDate>) -> Self {
        self.generated = dates;
        self
    }

    pub fn with_leadtimes(mut self, days: Vec<u32>) -> Self {
        self.leadtime_days = days;
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    /// Use `x`/`y` instead of `xc`/`yc` for the axes.
    pub fn with_axis_names(mut self, x: &str, y: &str) -> Self {
        self.x_name = x.to_string();
        self.y_name = y.to_string();
        self
    }

    /// Use other names for the data variables, e.g. `mean`/`stddev`.
    pub fn with_variable_names(mut self, mean: &str, stddev: &str) -> Self {
        self.mean_name = mean.to_string();
        self.stddev_name = stddev.to_string();
        self
    }

    /// Set one sample, addressed by time/lead-time index and axis values in km.
    pub fn with_sample(mut self, time: usize, lead: usize, x_km: f64, y_km: f64, mean: f64, stddev: f64) -> Self {
        let xi = position(&self.x_km, x_km);
        let yi = position(&self.y_km, y_km);
        self.samples.insert((time, lead, xi, yi), (mean, stddev));
        self
    }

    /// Fill every position with the same sample.
    pub fn filled(mut self, mean: f64, stddev: f64) -> Self {
        for t in 0..self.generated.len() {
            for l in 0..self.leadtime_days.len() {
                for xi in 0..self.x_km.len() {
                    for yi in 0..self.y_km.len() {
                        self.samples.insert((t, l, xi, yi), (mean, stddev));
                    }
                }
            }
        }
        self
    }

    pub fn build(&self) -> GriddedDataset {
        let epoch = date(1970, 1, 1);
        let times: Vec<f64> = self
            .generated
            .iter()
            .map(|d| (*d - epoch).num_days() as f64)
            .collect();
        let leads: Vec<f64> = self.leadtime_days.iter().map(|d| f64::from(*d)).collect();

        let dims = vec![
            Dimension::new("time", times.len()),
            Dimension::new(self.y_name.clone(), self.y_km.len()),
            Dimension::new(self.x_name.clone(), self.x_km.len()),
            Dimension::new("leadtime", leads.len()),
        ];

        let len = times.len() * self.y_km.len() * self.x_km.len() * leads.len();
        let mut mean = vec![f64::NAN; len];
        let mut stddev = vec![f64::NAN; len];
        for ((t, l, xi, yi), (m, s)) in &self.samples {
            let offset = ((t * self.y_km.len() + yi) * self.x_km.len() + xi) * leads.len() + l;
            mean[offset] = *m;
            stddev[offset] = *s;
        }

        let mut dataset = GriddedDataset::new()
            .with_variable(Variable::axis(self.x_name.clone(), self.x_km.clone()).with_attribute("units", "1000 meter"))
            .with_variable(Variable::axis(self.y_name.clone(), self.y_km.clone()).with_attribute("units", "1000 meter"))
            .with_variable(Variable::axis("time", times).with_attribute("units", TIME_UNITS))
            .with_variable(Variable::axis("leadtime", leads).with_attribute("units", "days"))
            .with_variable(Variable::new(self.mean_name.clone(), dims.clone(), mean).expect("fixture shape"))
            .with_variable(Variable::new(self.stddev_name.clone(), dims, stddev).expect("fixture shape"));

        for (name, value) in &self.attributes {
            dataset = dataset.with_attribute(name.clone(), value.clone());
        }
        dataset
    }
}

fn position(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .position(|v| (*v - value).abs() < 1e-9)
        .unwrap_or_else(|| panic!("{value} is not on the fixture axis {axis:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_example_layout() {
        let dataset = ForecastFixture::north_example().build();

        let mean = dataset.variable("sic_mean").unwrap();
        let lens: Vec<usize> = mean.dimensions.iter().map(|d| d.len).collect();
        assert_eq!(lens, vec![1, 2, 3, 1]);
        // (time 0, yc -100, xc 0, lead 0)
        assert_eq!(mean.value_at(&[0, 0, 1, 0]), Some(0.8));
        assert!(mean.value_at(&[0, 1, 1, 0]).unwrap().is_nan());
        assert_eq!(dataset.variable("time").unwrap().values, vec![19723.0]);
        assert_eq!(dataset.attribute("geospatial_lat_max").and_then(|v| v.as_f64()), Some(90.0));
    }

    #[test]
    fn test_filled_sets_every_sample() {
        let dataset = ForecastFixture::new(vec![0.0, 25.0], vec![0.0, 25.0])
            .with_leadtimes(vec![1, 2])
            .filled(0.5, 0.1)
            .build();
        let stddev = dataset.variable("sic_stddev").unwrap();
        assert!(stddev.values.iter().all(|v| *v == 0.1));
        assert_eq!(stddev.values.len(), 8);
    }

    #[test]
    #[should_panic(expected = "not on the fixture axis")]
    fn test_sample_off_axis_panics() {
        let _ = ForecastFixture::new(vec![0.0, 25.0], vec![0.0, 25.0]).with_sample(0, 0, 10.0, 0.0, 0.5, 0.1);
    }
}
