//! NumPy `.npy`/`.npz` loading and per-step GeoTIFF export.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use half::f16;
use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, ReadDataError, ReadNpyError, ReadNpzError, ReadableElement};
use py_literal::Value as PyValue;
use tracing::{info, instrument};

use crate::array::{RasterArray, Sample};
use crate::error::{RasterError, Result};
use crate::writer::save_geotiff;

/// Channels exported per time step.
const EXPORT_CHANNELS: usize = 3;

type NpzFile = NpzReader<BufReader<File>>;
type EntryReader = fn(&mut NpzFile, &str) -> Result<Option<RasterArray>>;
type NpyReader = fn(&Path) -> Result<Option<RasterArray>>;

/// One reader per element type; a wrong descriptor yields `None`.
const ENTRY_READERS: [EntryReader; 11] = [
    read_entry::<u8>,
    read_entry::<i8>,
    read_entry::<u16>,
    read_entry::<i16>,
    read_entry::<u32>,
    read_entry::<i32>,
    read_entry::<u64>,
    read_entry::<i64>,
    read_entry::<f32>,
    read_entry::<f64>,
    read_half_entry,
];

const NPY_READERS: [NpyReader; 11] = [
    read_npy_as::<u8>,
    read_npy_as::<i8>,
    read_npy_as::<u16>,
    read_npy_as::<i16>,
    read_npy_as::<u32>,
    read_npy_as::<i32>,
    read_npy_as::<u64>,
    read_npy_as::<i64>,
    read_npy_as::<f32>,
    read_npy_as::<f64>,
    read_half_npy,
];

/// Half-precision element of `<f2`/`>f2` arrays, widened to `f32` on load.
#[derive(Debug, Clone, Copy)]
struct Half(f16);

impl ReadableElement for Half {
    fn read_to_end_exact_vec<R: Read>(
        mut reader: R,
        type_desc: &PyValue,
        len: usize,
    ) -> std::result::Result<Vec<Self>, ReadDataError> {
        let little_endian = match type_desc {
            PyValue::String(s) if s == "<f2" => true,
            PyValue::String(s) if s == ">f2" => false,
            other => return Err(ReadDataError::WrongDescriptor(other.clone())),
        };

        let mut bytes = vec![0u8; len * 2];
        reader.read_exact(&mut bytes)?;
        let mut extra = Vec::new();
        reader.read_to_end(&mut extra)?;
        if !extra.is_empty() {
            return Err(ReadDataError::ExtraBytes(extra.len()));
        }

        Ok(bytes
            .chunks_exact(2)
            .map(|pair| {
                let pair = [pair[0], pair[1]];
                Half(if little_endian {
                    f16::from_le_bytes(pair)
                } else {
                    f16::from_be_bytes(pair)
                })
            })
            .collect())
    }
}

fn widen_half(array: ArrayD<Half>) -> RasterArray {
    RasterArray::F32(array.mapv(|h| h.0.to_f32()))
}

/// Names of the arrays in an `.npz` bundle, without the `.npy` suffix.
pub fn list_arrays(path: &Path) -> Result<Vec<String>> {
    let mut npz = open_npz(path)?;
    Ok(npz
        .names()
        .map_err(RasterError::npz)?
        .iter()
        .map(|name| display_name(name).to_string())
        .collect())
}

/// Load one array from an `.npz` bundle.
///
/// `key` may be given with or without the `.npy` suffix; the first array is
/// used when it is `None`. Returns the array's name and data.
pub fn read_npz(path: &Path, key: Option<&str>) -> Result<(String, RasterArray)> {
    let mut npz = open_npz(path)?;
    let names = npz.names().map_err(RasterError::npz)?;

    let entry = match key {
        Some(key) => names
            .iter()
            .find(|name| name.as_str() == key || display_name(name) == key)
            .cloned()
            .ok_or_else(|| RasterError::KeyNotFound {
                key: key.to_string(),
                path: path.to_path_buf(),
                available: names.iter().map(|n| display_name(n).to_string()).collect(),
            })?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| RasterError::npz(format!("{} contains no arrays", path.display())))?,
    };

    for reader in ENTRY_READERS {
        if let Some(array) = reader(&mut npz, &entry)? {
            return Ok((display_name(&entry).to_string(), array));
        }
    }
    Err(RasterError::UnsupportedDtype(format!(
        "array '{}' in {} has no supported element type",
        display_name(&entry),
        path.display()
    )))
}

/// Load a single `.npy` array.
pub fn read_npy(path: &Path) -> Result<RasterArray> {
    for reader in NPY_READERS {
        if let Some(array) = reader(path)? {
            return Ok(array);
        }
    }
    Err(RasterError::UnsupportedDtype(format!(
        "{} has no supported element type",
        path.display()
    )))
}

/// Export every time step of a `(H, W, C, N)` array as a 3-band GeoTIFF.
///
/// Step `i` is written to `<out_dir>/<archive stem><i>.tif` with `i`
/// zero-padded to the number of digits in `N`. `out_dir` defaults to the
/// archive's directory and is created when missing.
#[instrument(skip_all, fields(path = %path.display(), key = ?key))]
pub fn npz_to_geotiff(
    path: &Path,
    out_dir: Option<&Path>,
    key: Option<&str>,
    resolution: f64,
    crs_epsg: u32,
) -> Result<Vec<PathBuf>> {
    let (name, array) = read_npz(path, key)?;
    let steps = match array.shape() {
        [_, _, channels, steps] if *channels >= EXPORT_CHANNELS => *steps,
        shape => {
            return Err(RasterError::invalid_shape(
                shape,
                format!(
                    "array '{}' must be (height, width, >={} channels, steps)",
                    name, EXPORT_CHANNELS
                ),
            ))
        }
    };

    let out_dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    fs::create_dir_all(&out_dir)?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits = steps.to_string().len();

    let mut written = Vec::with_capacity(steps);
    for step in 0..steps {
        let output = out_dir.join(format!("{}{:0width$}.tif", stem, step, width = digits));
        let slice = array.time_slice(step, EXPORT_CHANNELS)?;
        save_geotiff(&slice, &output, resolution, crs_epsg, None)?;
        written.push(output);
    }

    info!(count = written.len(), out_dir = %out_dir.display(), "Exported time steps");
    Ok(written)
}

fn open_npz(path: &Path) -> Result<NpzFile> {
    let file = BufReader::new(File::open(path)?);
    NpzReader::new(file).map_err(RasterError::npz)
}

fn display_name(entry: &str) -> &str {
    entry.strip_suffix(".npy").unwrap_or(entry)
}

fn read_entry<T: Sample>(npz: &mut NpzFile, name: &str) -> Result<Option<RasterArray>> {
    match npz.by_name::<OwnedRepr<T>, IxDyn>(name) {
        Ok(array) => Ok(Some(T::into_raster(array))),
        Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => Ok(None),
        Err(err) => Err(RasterError::npz(err)),
    }
}

fn read_half_entry(npz: &mut NpzFile, name: &str) -> Result<Option<RasterArray>> {
    match npz.by_name::<OwnedRepr<Half>, IxDyn>(name) {
        Ok(array) => Ok(Some(widen_half(array))),
        Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => Ok(None),
        Err(err) => Err(RasterError::npz(err)),
    }
}

fn read_half_npy(path: &Path) -> Result<Option<RasterArray>> {
    match ndarray_npy::read_npy::<_, ArrayD<Half>>(path) {
        Ok(array) => Ok(Some(widen_half(array))),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(err) => Err(RasterError::npz(err)),
    }
}

fn read_npy_as<T: Sample>(path: &Path) -> Result<Option<RasterArray>> {
    match ndarray_npy::read_npy::<_, ndarray::ArrayD<T>>(path) {
        Ok(array) => Ok(Some(T::into_raster(array))),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(err) => Err(RasterError::npz(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use ndarray::{arr2, Array4};
    use tempfile::TempDir;

    #[test]
    fn test_read_npz_by_key_and_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.npz");
        let first = arr2(&[[1i16, -2], [3, 4]]);
        let second = arr2(&[[9i16, 8]]);
        test_utils::write_npz(&path, &[("first", &first), ("second", &second)]).unwrap();

        let (name, array) = read_npz(&path, None).unwrap();
        assert_eq!(name, "first");
        assert_eq!(array, RasterArray::from(first));

        let (name, array) = read_npz(&path, Some("second.npy")).unwrap();
        assert_eq!(name, "second");
        assert_eq!(array.dtype(), DType::I16);
        assert_eq!(array.shape(), &[1, 2]);

        assert_eq!(list_arrays(&path).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_missing_key_lists_available() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.npz");
        test_utils::write_npz(&path, &[("highresdynamic", &arr2(&[[0.5f32]]))]).unwrap();

        match read_npz(&path, Some("mesodynamic")) {
            Err(RasterError::KeyNotFound { key, available, .. }) => {
                assert_eq!(key, "mesodynamic");
                assert_eq!(available, vec!["highresdynamic"]);
            }
            other => panic!("expected KeyNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_read_deflated_npz() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("compressed.npz");
        let values = arr2(&[[0.25f32, 0.5], [0.75, 1.0]]);
        test_utils::write_npz_compressed(&path, &[("highresdynamic", &values)]).unwrap();

        let (name, array) = read_npz(&path, None).unwrap();
        assert_eq!(name, "highresdynamic");
        assert_eq!(array, RasterArray::from(values));
    }

    #[test]
    fn test_half_float_entries_widen_to_f32() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("half.npz");
        // All exactly representable in float16.
        let values = [0.0f32, 0.5, -1.25, 1024.0, 0.125, 3.0];
        test_utils::write_npz_f16(&path, "highresdynamic", &[2, 3], &values).unwrap();

        let (_, array) = read_npz(&path, Some("highresdynamic")).unwrap();
        assert_eq!(array.dtype(), DType::F32);
        assert_eq!(
            array,
            RasterArray::from(arr2(&[[0.0f32, 0.5, -1.25], [1024.0, 0.125, 3.0]]))
        );
    }

    #[test]
    fn test_read_npy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.npy");
        let values = arr2(&[[1.25f64, 2.5], [3.75, 5.0]]);
        ndarray_npy::write_npy(&path, &values).unwrap();

        assert_eq!(read_npy(&path).unwrap(), RasterArray::from(values));
    }

    #[test]
    fn test_export_rejects_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.npz");
        let two_channels = Array4::<f32>::zeros((2, 2, 2, 3));
        test_utils::write_npz(&path, &[("x", &two_channels)]).unwrap();

        assert!(matches!(
            npz_to_geotiff(&path, None, None, 10.0, 3857),
            Err(RasterError::InvalidShape { .. })
        ));
    }
}
