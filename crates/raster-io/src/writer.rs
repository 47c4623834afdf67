//! High-level raster writers.
//!
//! [`save_geotiff`] places an array on a synthetic grid anchored at the
//! origin. [`array_to_image`] either copies georeferencing from a reference
//! raster or falls back to a flat image.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::array::RasterArray;
use crate::dtype::{infer_dtype, DType};
use crate::error::{RasterError, Result};
use crate::geo::{Affine, Compression, Crs, GeoMetadata};
use crate::geotiff::{read_metadata, write_geotiff, GeoTiffProfile};
use crate::image_io::{load_rgb, save_image, ImageSaveOptions};

/// Ground size of one pixel used when none is given.
pub const DEFAULT_RESOLUTION: f64 = 10.0;

/// Web Mercator.
pub const DEFAULT_EPSG: u32 = 3857;

/// Write an array as an uncompressed GeoTIFF with bounds
/// `(0, 0, resolution * width, resolution * height)`.
///
/// The array is cast to `dtype` (default: its own type, `F16` widened to
/// `F32`). 2-D arrays become one band, 3-D arrays one band per trailing slice.
#[instrument(skip(array), fields(path = %output.display(), shape = ?array.shape()))]
pub fn save_geotiff(
    array: &RasterArray,
    output: &Path,
    resolution: f64,
    crs_epsg: u32,
    dtype: Option<DType>,
) -> Result<GeoMetadata> {
    array.ensure_raster_shape()?;

    let (width, height) = (array.width(), array.height());
    let transform = Affine::from_bounds(
        0.0,
        0.0,
        resolution * width as f64,
        resolution * height as f64,
        width,
        height,
    );
    let dtype = dtype.unwrap_or_else(|| array.dtype()).storage();
    let data = array.cast(dtype);

    let meta = write_geotiff(
        output,
        &data,
        &GeoTiffProfile {
            crs: Some(Crs::from_epsg(crs_epsg)),
            transform: Some(transform),
            compression: Compression::None,
        },
    )?;

    info!(bands = meta.bands, dtype = %meta.dtype, "Saved GeoTIFF");
    Ok(meta)
}

/// Source of the pixels for [`array_to_image`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayInput {
    Array(RasterArray),
    /// Any decodable image, read as RGB `u8`.
    ImagePath(PathBuf),
}

impl From<RasterArray> for ArrayInput {
    fn from(array: RasterArray) -> Self {
        Self::Array(array)
    }
}

impl From<PathBuf> for ArrayInput {
    fn from(path: PathBuf) -> Self {
        Self::ImagePath(path)
    }
}

impl From<&Path> for ArrayInput {
    fn from(path: &Path) -> Self {
        Self::ImagePath(path.to_path_buf())
    }
}

/// Write an array (or image file) to `output`.
///
/// A `.tif`/`.tiff` output with a `reference` raster is georeferenced like the
/// reference: CRS and transform are copied, compression is inherited unless
/// given, and the dtype is inferred from the value range unless given.
/// Any other combination writes a flat image through `save`.
#[instrument(skip(input, save), fields(path = %output.display()))]
pub fn array_to_image(
    input: ArrayInput,
    output: &Path,
    reference: Option<&Path>,
    dtype: Option<DType>,
    compress: Option<Compression>,
    save: &ImageSaveOptions,
) -> Result<PathBuf> {
    let array = match input {
        ArrayInput::Array(array) => array,
        ArrayInput::ImagePath(path) => load_rgb(&path)?,
    };

    match reference {
        Some(reference) if is_tiff_path(output) => {
            write_projected(&array, output, reference, dtype, compress)?;
        }
        _ => {
            save_image(&array, output, save)?;
            info!(shape = ?array.shape(), "Saved image");
        }
    }

    Ok(output.to_path_buf())
}

fn write_projected(
    array: &RasterArray,
    output: &Path,
    reference: &Path,
    dtype: Option<DType>,
    compress: Option<Compression>,
) -> Result<GeoMetadata> {
    array.ensure_raster_shape()?;
    let profile = read_metadata(reference)?;

    let compression = match compress {
        Some(compression) if !compression.is_writable() => {
            return Err(RasterError::UnsupportedCompression(format!(
                "{} cannot be used for writing",
                compression
            )))
        }
        Some(compression) => compression,
        None if profile.compression.is_writable() => profile.compression,
        None => {
            warn!(
                reference = %reference.display(),
                inherited = %profile.compression,
                "Reference compression cannot be written, using deflate"
            );
            Compression::Deflate
        }
    };

    let dtype = match dtype {
        Some(dtype) => dtype,
        None => {
            let (min, max) = array.min_max().unwrap_or((f64::NAN, f64::NAN));
            infer_dtype(min, max)
        }
    }
    .storage();

    let meta = write_geotiff(
        output,
        &array.cast(dtype),
        &GeoTiffProfile {
            crs: profile.crs,
            transform: profile.transform,
            compression,
        },
    )?;

    info!(
        bands = meta.bands,
        dtype = %meta.dtype,
        compression = %meta.compression,
        reference = %reference.display(),
        "Saved projected GeoTIFF"
    );
    Ok(meta)
}

fn is_tiff_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tiff_path() {
        assert!(is_tiff_path(Path::new("out/a.tif")));
        assert!(is_tiff_path(Path::new("B.TIFF")));
        assert!(!is_tiff_path(Path::new("a.png")));
        assert!(!is_tiff_path(Path::new("tif")));
    }

    #[test]
    fn test_input_conversions() {
        let input: ArrayInput = Path::new("img.png").into();
        assert_eq!(input, ArrayInput::ImagePath(PathBuf::from("img.png")));
    }
}
