//! Error types for raster and image conversion.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while converting arrays to rasters or images.
#[derive(Error, Debug)]
pub enum RasterError {
    /// Array shape does not fit the operation (dimensionality, band count).
    #[error("invalid array shape {shape:?}: {message}")]
    InvalidShape { shape: Vec<usize>, message: String },

    /// Element type is not supported by the target format.
    #[error("unsupported data type: {0}")]
    UnsupportedDtype(String),

    /// Compression scheme is not supported for this operation.
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// TIFF encoding or decoding failed.
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// GeoTIFF metadata is missing or malformed.
    #[error("invalid raster metadata: {0}")]
    Metadata(String),

    /// NPY/NPZ reading failed.
    #[error("numeric archive error: {0}")]
    Npz(String),

    /// The requested array key does not exist in the archive.
    #[error("array '{key}' not found in {path} (available: {available:?})")]
    KeyNotFound {
        key: String,
        path: PathBuf,
        available: Vec<String>,
    },

    /// Flat image encoding or decoding failed.
    #[error("image error: {0}")]
    Image(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl RasterError {
    /// Create an InvalidShape error.
    pub fn invalid_shape(shape: &[usize], msg: impl Into<String>) -> Self {
        Self::InvalidShape {
            shape: shape.to_vec(),
            message: msg.into(),
        }
    }

    /// Create a Metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create an Npz error.
    pub fn npz(msg: impl ToString) -> Self {
        Self::Npz(msg.to_string())
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tiff::TiffError> for RasterError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Tiff(err.to_string())
    }
}

impl From<image::ImageError> for RasterError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<ndarray::ShapeError> for RasterError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InvalidShape {
            shape: Vec::new(),
            message: err.to_string(),
        }
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
