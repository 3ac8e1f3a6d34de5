//! Forecast loader.
//!
//! Turns a decoded dataset into the hemisphere, the integer-metre axes and a
//! flat list of valid samples, one per (time, lead time, x, y). Nothing here
//! touches the store, so a decode failure never leaves partial writes.

use bytes::Bytes;
use chrono::{Days, NaiveDate};
use icenet_common::Hemisphere;
use netcdf_parser::{read_gridded_from_bytes, CfTimeUnits, GriddedDataset, Variable};
use tracing::{debug, info};

use crate::error::{IngestionError, Result};
use crate::hemisphere::resolve_hemisphere;

pub const MEAN_VARIABLE: &str = "sic_mean";
pub const STDDEV_VARIABLE: &str = "sic_stddev";

const X_AXES: [&str; 2] = ["xc", "x"];
const Y_AXES: [&str; 2] = ["yc", "y"];
const TIME_AXIS: &str = "time";
const LEADTIME_AXIS: &str = "leadtime";

/// One valid forecast value at a grid position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSample {
    pub generated: NaiveDate,
    pub forecast_for: NaiveDate,
    pub x_m: i32,
    pub y_m: i32,
    pub mean: f64,
    pub stddev: f64,
}

/// Everything later pipeline stages need from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedForecast {
    pub hemisphere: Hemisphere,
    pub x_m: Vec<i32>,
    pub y_m: Vec<i32>,
    pub samples: Vec<ForecastSample>,
    /// Distinct generation dates, ascending
    pub generated_dates: Vec<NaiveDate>,
    /// Positions skipped for a missing or non-positive mean, or missing stddev
    pub dropped: usize,
}

/// Decode a NetCDF buffer on a blocking worker.
pub async fn decode(data: Bytes) -> Result<GriddedDataset> {
    let dataset = tokio::task::spawn_blocking(move || read_gridded_from_bytes(&data)).await??;
    Ok(dataset)
}

/// Resolve the hemisphere and extract axes and samples.
pub fn load(mut dataset: GriddedDataset) -> Result<LoadedForecast> {
    let hemisphere = resolve_hemisphere(&dataset)?;

    normalise_variable_names(&mut dataset);

    let x_axis = axis(&dataset, &X_AXES)?;
    let y_axis = axis(&dataset, &Y_AXES)?;
    let x_m = to_metres(x_axis)?;
    let y_m = to_metres(y_axis)?;

    let generated = generation_dates(&dataset)?;
    let leadtimes = leadtime_days(&dataset)?;

    let mean = required(&dataset, MEAN_VARIABLE)?;
    let stddev = required(&dataset, STDDEV_VARIABLE)?;
    let layout = [
        (TIME_AXIS, generated.len()),
        (LEADTIME_AXIS, leadtimes.len()),
        (x_axis.name.as_str(), x_m.len()),
        (y_axis.name.as_str(), y_m.len()),
    ];
    let mean_index = IndexMap::new(mean, &layout)?;
    let stddev_index = IndexMap::new(stddev, &layout)?;

    let total = generated.len() * leadtimes.len() * x_m.len() * y_m.len();
    let mut samples = Vec::new();

    for (t, generated_on) in generated.iter().enumerate() {
        for (l, lead) in leadtimes.iter().enumerate() {
            let forecast_for = generated_on
                .checked_add_days(Days::new(*lead))
                .ok_or_else(|| IngestionError::Decode(format!("lead time of {lead} days overflows the calendar")))?;

            for (xi, x) in x_m.iter().enumerate() {
                for (yi, y) in y_m.iter().enumerate() {
                    let index = [t, l, xi, yi];
                    let m = mean_index.value(mean, &index);
                    let s = stddev_index.value(stddev, &index);
                    if m.is_nan() || m <= 0.0 || s.is_nan() {
                        continue;
                    }
                    samples.push(ForecastSample {
                        generated: *generated_on,
                        forecast_for,
                        x_m: *x,
                        y_m: *y,
                        mean: m,
                        stddev: s,
                    });
                }
            }
        }
    }
    let mut generated_dates = generated;
    generated_dates.sort_unstable();
    generated_dates.dedup();

    let dropped = total - samples.len();
    info!(
        hemisphere = %hemisphere,
        nx = x_m.len(),
        ny = y_m.len(),
        generation_dates = generated_dates.len(),
        leadtimes = leadtimes.len(),
        samples = samples.len(),
        dropped,
        "Loaded forecast"
    );

    Ok(LoadedForecast {
        hemisphere,
        x_m,
        y_m,
        samples,
        generated_dates,
        dropped,
    })
}

/// `mean`/`stddev` become `sic_mean`/`sic_stddev` unless those already exist.
fn normalise_variable_names(dataset: &mut GriddedDataset) {
    for (alias, canonical) in [("mean", MEAN_VARIABLE), ("stddev", STDDEV_VARIABLE)] {
        if !dataset.has_variable(canonical) && dataset.rename_variable(alias, canonical) {
            debug!(from = alias, to = canonical, "Renamed data variable");
        }
    }
}

fn required<'a>(dataset: &'a GriddedDataset, name: &str) -> Result<&'a Variable> {
    dataset
        .variable(name)
        .ok_or_else(|| IngestionError::Decode(format!("variable '{name}' is missing")))
}

fn axis<'a>(dataset: &'a GriddedDataset, names: &[&str]) -> Result<&'a Variable> {
    let variable = dataset
        .first_variable(names)
        .ok_or_else(|| IngestionError::Decode(format!("none of the axes {names:?} is present")))?;
    if variable.values.len() < 2 {
        return Err(IngestionError::Decode(format!(
            "axis '{}' has {} point(s), at least 2 are required",
            variable.name,
            variable.values.len()
        )));
    }
    Ok(variable)
}

/// Kilometres to whole metres.
fn to_metres(axis: &Variable) -> Result<Vec<i32>> {
    axis.values
        .iter()
        .map(|km| {
            let m = (km * 1000.0).round();
            if m.is_finite() && m >= f64::from(i32::MIN) && m <= f64::from(i32::MAX) {
                Ok(m as i32)
            } else {
                Err(IngestionError::Decode(format!(
                    "axis '{}' value {km} km is not a representable coordinate",
                    axis.name
                )))
            }
        })
        .collect()
}

fn generation_dates(dataset: &GriddedDataset) -> Result<Vec<NaiveDate>> {
    let time = required(dataset, TIME_AXIS)?;
    let units = time
        .attribute("units")
        .and_then(|u| u.as_text())
        .ok_or_else(|| IngestionError::Decode("'time' has no units attribute".to_string()))?;
    let units = CfTimeUnits::parse(units)?;

    time.values
        .iter()
        .map(|offset| {
            units
                .to_datetime(*offset)
                .map(|dt| dt.date())
                .ok_or_else(|| IngestionError::Decode(format!("time value {offset} cannot be decoded")))
        })
        .collect()
}

fn leadtime_days(dataset: &GriddedDataset) -> Result<Vec<u64>> {
    required(dataset, LEADTIME_AXIS)?
        .values
        .iter()
        .map(|days| {
            if days.is_finite() && *days >= 0.0 {
                Ok(days.round() as u64)
            } else {
                Err(IngestionError::Decode(format!("lead time {days} is not a day count")))
            }
        })
        .collect()
}

/// Maps `[time, leadtime, x, y]` onto a variable's own dimension order.
#[derive(Debug)]
struct IndexMap {
    /// For each variable dimension, which logical axis feeds it
    sources: Vec<Option<usize>>,
}

impl IndexMap {
    fn new(variable: &Variable, layout: &[(&str, usize); 4]) -> Result<Self> {
        let mut sources = Vec::with_capacity(variable.dimensions.len());
        for dim in &variable.dimensions {
            match layout.iter().position(|(name, _)| *name == dim.name) {
                Some(axis) if layout[axis].1 == dim.len => sources.push(Some(axis)),
                Some(axis) => {
                    return Err(IngestionError::Decode(format!(
                        "'{}' dimension '{}' has length {}, axis has {}",
                        variable.name, dim.name, dim.len, layout[axis].1
                    )))
                }
                // Extra singleton dimensions are pinned to 0
                None if dim.len == 1 => sources.push(None),
                None => {
                    return Err(IngestionError::Decode(format!(
                        "'{}' has unexpected dimension '{}'",
                        variable.name, dim.name
                    )))
                }
            }
        }

        for (axis, (name, len)) in layout.iter().enumerate() {
            if *len > 1 && !sources.contains(&Some(axis)) {
                return Err(IngestionError::Decode(format!(
                    "'{}' does not span the '{name}' axis",
                    variable.name
                )));
            }
        }

        Ok(Self { sources })
    }

    fn value(&self, variable: &Variable, logical: &[usize; 4]) -> f64 {
        let index: Vec<usize> = self
            .sources
            .iter()
            .map(|source| source.map_or(0, |axis| logical[axis]))
            .collect();
        variable.value_at(&index).unwrap_or(f64::NAN)
    }
}
