//! The transfer capability the download pipeline delegates to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::options::FetchOptions;

/// Moves the bytes behind a URL onto the local filesystem.
///
/// `output` is either the file to create or an existing directory, in which
/// case the implementation picks the file name (server-provided name first,
/// URL basename second). Returns the path actually written.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, output: &Path, options: &FetchOptions) -> Result<PathBuf>;
}
