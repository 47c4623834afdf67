//! Error types for fetching and extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching or unpacking a file.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP client could not be built from the supplied options.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// The request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The request itself is malformed (bad URL, mismatched batch lists).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No output file name could be derived.
    #[error("cannot determine an output file name for {0}")]
    MissingOutput(String),

    /// Google Drive did not hand out a download link.
    #[error("failed to retrieve file URL from Google Drive: {0}")]
    DriveRetrieval(String),

    /// The transfer finished with a different size than announced.
    #[error("download size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The transfer kept failing after all retries.
    #[error("download failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Archive extraction failed.
    #[error("failed to extract {path}: {message}")]
    Extract { path: PathBuf, message: String },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl FetchError {
    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    /// Create an InvalidRequest error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an Extract error.
    pub fn extract(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::Extract {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Whether retrying the same transfer could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::SizeMismatch { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::request("connection reset").is_transient());
        assert!(FetchError::HttpStatus {
            url: "http://example.com".into(),
            status: 503
        }
        .is_transient());
        assert!(!FetchError::HttpStatus {
            url: "http://example.com".into(),
            status: 404
        }
        .is_transient());
        assert!(!FetchError::invalid_request("bad").is_transient());
    }
}
