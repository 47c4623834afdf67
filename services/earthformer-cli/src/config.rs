//! Fetch settings from flags, environment and an optional YAML profile.
//!
//! The profile is parsed into [`FetchOptions`] first; flags given on the
//! command line then override it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use fetcher::{ClientConfig, FetchOptions, TlsVerify};
use tracing::debug;

/// Transfer flags shared by the download commands.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// YAML file with default fetch options
    #[arg(long, env = "EARTHFORMER_FETCH_CONFIG")]
    pub fetch_config: Option<PathBuf>,

    /// Only log progress at debug level
    #[arg(long)]
    pub quiet: bool,

    /// Proxy URL for all schemes
    #[arg(long, env = "EARTHFORMER_PROXY")]
    pub proxy: Option<String>,

    /// Rate limit in bytes per second
    #[arg(long)]
    pub speed: Option<f64>,

    /// Do not keep cookies between requests
    #[arg(long)]
    pub no_cookies: bool,

    /// Skip TLS certificate verification
    #[arg(long, conflicts_with = "ca_bundle")]
    pub insecure: bool,

    /// CA bundle used to verify TLS certificates
    #[arg(long, env = "EARTHFORMER_CA_BUNDLE")]
    pub ca_bundle: Option<PathBuf>,

    /// Accept any Google Drive link shape
    #[arg(long)]
    pub fuzzy: bool,

    /// Continue partially downloaded files
    #[arg(long)]
    pub resume: bool,

    /// Keep archives packed
    #[arg(long)]
    pub no_unzip: bool,

    /// Replace existing files
    #[arg(long)]
    pub overwrite: bool,

    /// Extract archives into a directory named after the archive
    #[arg(long)]
    pub subfolder: bool,

    /// Maximum retry attempts per download
    #[arg(long, env = "EARTHFORMER_MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Request timeout in seconds
    #[arg(long, env = "EARTHFORMER_TIMEOUT", default_value = "600")]
    pub timeout: u64,
}

impl FetchArgs {
    /// Resolve the effective options: profile first, then flags.
    pub fn fetch_options(&self) -> Result<FetchOptions> {
        let mut options = match &self.fetch_config {
            Some(path) => load_profile(path)?,
            None => FetchOptions::default(),
        };

        options.quiet |= self.quiet;
        options.fuzzy |= self.fuzzy;
        options.resume |= self.resume;
        options.overwrite |= self.overwrite;
        options.subfolder |= self.subfolder;
        if self.no_cookies {
            options.use_cookies = false;
        }
        if self.no_unzip {
            options.unzip = false;
        }
        if let Some(proxy) = &self.proxy {
            options.proxy = Some(proxy.clone());
        }
        if let Some(speed) = self.speed {
            options.speed = Some(speed);
        }
        if self.insecure {
            options.verify = TlsVerify::Flag(false);
        } else if let Some(bundle) = &self.ca_bundle {
            options.verify = TlsVerify::CaBundle(bundle.clone());
        }

        Ok(options)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            max_retries: self.max_retries,
            request_timeout: Duration::from_secs(self.timeout),
            ..ClientConfig::default()
        }
    }
}

fn load_profile(path: &Path) -> Result<FetchOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fetch config {}", path.display()))?;
    let options: FetchOptions = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse fetch config {}", path.display()))?;
    debug!(path = %path.display(), ?options, "Loaded fetch profile");
    Ok(options)
}
