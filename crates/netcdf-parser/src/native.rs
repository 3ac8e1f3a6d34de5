//! Native NetCDF decoding using the netcdf library.
//!
//! The netcdf library requires a file path (it wraps libnetcdf/HDF5 which need
//! file handles). When reading from bytes, we write to a temp file first.
//! On Linux, `/dev/shm` (memory-backed tmpfs) is used when writable.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use tracing::debug;

use crate::dataset::{AttributeValue, Dimension, GriddedDataset, Variable};
use crate::error::{NetCdfError, NetCdfResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully (e.g. probing optional attributes). Call this early,
/// before any HDF5/NetCDF operation; repeated calls are no-ops.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Decode a NetCDF buffer into a [`GriddedDataset`].
///
/// The buffer is staged in a temp file that is removed before returning,
/// on both success and failure.
pub fn read_gridded_from_bytes(data: &[u8]) -> NetCdfResult<GriddedDataset> {
    silence_hdf5_errors();

    let staged = StagedFile::write(data)?;
    read_gridded_from_path(staged.path())
}

/// Decode a NetCDF file on disk into a [`GriddedDataset`].
///
/// Global attributes and every numeric variable are read. Variables the
/// library cannot convert to `f64` (strings, compound types) are skipped.
pub fn read_gridded_from_path(path: &Path) -> NetCdfResult<GriddedDataset> {
    silence_hdf5_errors();

    let nc_file = netcdf::open(path)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

    let mut dataset = GriddedDataset::new();
    dataset.attributes = collect_attributes(nc_file.attributes());

    for var in nc_file.variables() {
        let name = var.name();
        let dimensions: Vec<Dimension> = var
            .dimensions()
            .iter()
            .map(|d| Dimension::new(d.name(), d.len()))
            .collect();

        let raw: Vec<f64> = match var.get_values::<f64, _>(..) {
            Ok(values) => values,
            Err(e) => {
                debug!(variable = %name, error = %e, "Skipping non-numeric variable");
                continue;
            }
        };

        let attributes = collect_attributes(var.attributes());
        let values = unpack_values(raw, &attributes);

        let mut variable = Variable::new(name, dimensions, values)?;
        variable.attributes = attributes;
        dataset.insert_variable(variable);
    }

    debug!(
        variables = dataset.variables.len(),
        attributes = dataset.attributes.len(),
        "Decoded NetCDF dataset"
    );

    Ok(dataset)
}

/// Apply CF missing-value and packing conventions.
///
/// Entries equal to `_FillValue` or `missing_value` (and NaN) become NaN;
/// everything else is `raw * scale_factor + add_offset`.
pub(crate) fn unpack_values(raw: Vec<f64>, attributes: &BTreeMap<String, AttributeValue>) -> Vec<f64> {
    let number = |name: &str| attributes.get(name).and_then(AttributeValue::as_f64);
    let fill_value = number("_FillValue");
    let missing_value = number("missing_value");
    let scale = number("scale_factor").unwrap_or(1.0);
    let offset = number("add_offset").unwrap_or(0.0);

    raw.into_iter()
        .map(|v| {
            if v.is_nan() || Some(v) == fill_value || Some(v) == missing_value {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect()
}

fn collect_attributes<'a>(
    attrs: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> BTreeMap<String, AttributeValue> {
    attrs
        .filter_map(|attr| {
            let name = attr.name().to_string();
            match attr.value() {
                Ok(value) => convert_attribute(value).map(|v| (name, v)),
                Err(e) => {
                    debug!(attribute = %name, error = %e, "Skipping unreadable attribute");
                    None
                }
            }
        })
        .collect()
}

fn convert_attribute(value: netcdf::AttributeValue) -> Option<AttributeValue> {
    use netcdf::AttributeValue as Nc;

    fn many<T: Copy + Into<f64>>(values: Vec<T>) -> AttributeValue {
        AttributeValue::Numbers(values.into_iter().map(Into::into).collect())
    }

    let converted = match value {
        Nc::Uchar(v) => AttributeValue::Number(v.into()),
        Nc::Schar(v) => AttributeValue::Number(v.into()),
        Nc::Ushort(v) => AttributeValue::Number(v.into()),
        Nc::Short(v) => AttributeValue::Number(v.into()),
        Nc::Uint(v) => AttributeValue::Number(v.into()),
        Nc::Int(v) => AttributeValue::Number(v.into()),
        Nc::Ulonglong(v) => AttributeValue::Number(v as f64),
        Nc::Longlong(v) => AttributeValue::Number(v as f64),
        Nc::Float(v) => AttributeValue::Number(v.into()),
        Nc::Double(v) => AttributeValue::Number(v),
        Nc::Uchars(v) => many(v),
        Nc::Schars(v) => many(v),
        Nc::Ushorts(v) => many(v),
        Nc::Shorts(v) => many(v),
        Nc::Uints(v) => many(v),
        Nc::Ints(v) => many(v),
        Nc::Ulonglongs(v) => AttributeValue::Numbers(v.into_iter().map(|x| x as f64).collect()),
        Nc::Longlongs(v) => AttributeValue::Numbers(v.into_iter().map(|x| x as f64).collect()),
        Nc::Floats(v) => many(v),
        Nc::Doubles(v) => AttributeValue::Numbers(v),
        Nc::Str(v) => AttributeValue::Text(v),
        Nc::Strs(v) => AttributeValue::Text(v.join(" ")),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(converted)
}

// =============================================================================
// Temp file staging
// =============================================================================

/// A temp copy of an in-memory buffer, deleted on drop.
struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    fn write(data: &[u8]) -> NetCdfResult<Self> {
        let staged = Self {
            path: get_optimal_temp_dir().join(generate_temp_filename()),
        };
        let mut file = std::fs::File::create(&staged.path)?;
        file.write_all(data)?;
        Ok(staged)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Get the optimal temp directory for NetCDF file operations.
///
/// On Linux, uses /dev/shm (memory-backed tmpfs) if available for faster I/O.
/// Falls back to the system temp directory otherwise.
fn get_optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.is_dir() {
            let test_path = shm_path.join(format!(".icenet_shm_check_{}", std::process::id()));
            if std::fs::write(&test_path, b"check").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Unique temp file name: process ID, thread ID and a counter.
fn generate_temp_filename() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let tid = std::thread::current().id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("icenet_forecast_{}_{:?}_{}.nc", pid, tid, count)
}
