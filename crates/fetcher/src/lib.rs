//! Remote file fetching for dataset and checkpoint archives.
//!
//! - GitHub "blob" page links are rewritten to raw-content links
//! - Google Drive shared links and file ids are resolved, including the
//!   confirmation page served for large files
//! - Transfers resume from `.part` files, retry, and can be rate limited
//! - `.zip`, `.tar` and `.tar.gz` downloads are extracted in place or into a
//!   subfolder
//!
//! # Example
//!
//! ```ignore
//! use fetcher::{ClientConfig, Downloader, FetchOptions, Source};
//!
//! let downloader = Downloader::http(ClientConfig::default())?;
//! let path = downloader
//!     .download_file(
//!         &Source::url("https://github.com/org/repo/blob/main/data.zip"),
//!         Some("data/data.zip".as_ref()),
//!         &FetchOptions::default(),
//!     )
//!     .await?;
//! ```

pub mod download;
pub mod drive;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod options;
pub mod pipeline;
pub mod url;

pub use download::{DownloadProgress, HttpFetcher};
pub use error::{FetchError, Result};
pub use extract::{extract_archive, extraction_target, ArchiveKind};
pub use fetch::Fetcher;
pub use options::{ClientConfig, FetchOptions, Source, TlsVerify};
pub use pipeline::Downloader;
pub use url::github_raw_url;
