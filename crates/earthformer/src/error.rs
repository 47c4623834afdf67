//! Error types for the earthformer helpers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by display and resource helpers.
#[derive(Error, Debug)]
pub enum EarthformerError {
    /// Download failure.
    #[error(transparent)]
    Fetch(#[from] fetcher::FetchError),

    /// Array, GeoTIFF or image conversion failure.
    #[error(transparent)]
    Raster(#[from] raster_io::RasterError),

    /// An input path that should exist does not.
    #[error("Input path {} does not exist.", .0.display())]
    PathNotFound(PathBuf),

    /// A bundled resource is missing.
    #[error("File not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// No directory is known for the named package.
    #[error("package directory for '{0}' is unknown; set {1}")]
    PackageNotFound(String, String),

    /// A bundled resource could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The image viewer could not be launched or written.
    #[error("viewer error: {0}")]
    Viewer(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl EarthformerError {
    pub fn viewer(msg: impl ToString) -> Self {
        Self::Viewer(msg.to_string())
    }
}

impl From<std::io::Error> for EarthformerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EarthformerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for earthformer helpers.
pub type Result<T> = std::result::Result<T, EarthformerError>;
