//! Per-download options and HTTP client settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Where a file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Any URL: plain HTTP(S), GitHub blob page, Google Drive link.
    Url(String),
    /// A bare Google Drive file id.
    DriveId(String),
}

impl Source {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn drive_id(id: impl Into<String>) -> Self {
        Self::DriveId(id.into())
    }
}

/// TLS certificate verification mode.
///
/// Deserializes from either a boolean or a path to a CA bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TlsVerify {
    Flag(bool),
    CaBundle(PathBuf),
}

impl Default for TlsVerify {
    fn default() -> Self {
        Self::Flag(true)
    }
}

/// Options applied to a single download (or uniformly to a batch).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Log per-file progress at debug level only
    pub quiet: bool,
    /// Proxy URL used for every scheme
    pub proxy: Option<String>,
    /// Transfer rate limit in bytes per second
    pub speed: Option<f64>,
    /// Keep cookies across the requests of one download
    pub use_cookies: bool,
    pub verify: TlsVerify,
    /// Extract a Google Drive file id from any Drive link shape
    pub fuzzy: bool,
    /// Continue from an existing `.part` file
    pub resume: bool,
    /// Extract `.zip`, `.tar` and `.tar.gz` files after download
    pub unzip: bool,
    /// Download even if the output already exists
    pub overwrite: bool,
    /// Extract into a directory named after the archive
    pub subfolder: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            proxy: None,
            speed: None,
            use_cookies: true,
            verify: TlsVerify::default(),
            fuzzy: false,
            resume: false,
            unzip: true,
            overwrite: false,
            subfolder: false,
        }
    }
}

/// Settings for the HTTP fetch capability.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum number of retry attempts per download
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Bytes between progress log lines
    pub progress_interval: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(600), // 10 minutes
            connect_timeout: Duration::from_secs(30),
            progress_interval: 1_000_000, // 1MB
            user_agent: concat!("earthformer-utils/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_behaviour() {
        let options = FetchOptions::default();
        assert!(options.unzip);
        assert!(options.use_cookies);
        assert!(!options.overwrite);
        assert!(!options.subfolder);
        assert_eq!(options.verify, TlsVerify::Flag(true));
    }

    #[test]
    fn test_options_from_yaml_profile() {
        let yaml = r#"
proxy: "http://proxy.local:3128"
speed: 262144
verify: /etc/ssl/custom.pem
unzip: false
"#;
        let options: FetchOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(options.speed, Some(262144.0));
        assert_eq!(
            options.verify,
            TlsVerify::CaBundle(PathBuf::from("/etc/ssl/custom.pem"))
        );
        assert!(!options.unzip);
        assert!(options.use_cookies);
    }

    #[test]
    fn test_verify_flag_from_yaml() {
        let options: FetchOptions = serde_yaml::from_str("verify: false").unwrap();
        assert_eq!(options.verify, TlsVerify::Flag(false));
    }
}
