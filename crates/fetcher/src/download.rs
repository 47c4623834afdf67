//! HTTP fetch capability with resumption, retry and rate limiting.
//!
//! Key features:
//! - HTTP Range requests to continue `.part` files
//! - Exponential backoff retry on transient failures
//! - Byte-rate limiting
//! - Google Drive confirmation pages followed before the transfer
//! - File integrity verification via Content-Length

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Certificate, Client, Proxy, Response, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::drive;
use crate::error::{FetchError, Result};
use crate::fetch::Fetcher;
use crate::options::{ClientConfig, FetchOptions, TlsVerify};
use crate::url::url_basename;

/// Confirmation pages followed before giving up on a Drive file.
const MAX_DRIVE_HOPS: usize = 4;

/// Longest single pause taken while throttling to the requested speed.
const MAX_THROTTLE_SLEEP: Duration = Duration::from_secs(60);

/// Download progress information.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub url: String,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub retry_count: u32,
}

impl DownloadProgress {
    fn new(url: &str, downloaded_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            url: url.to_string(),
            total_bytes: None,
            downloaded_bytes,
            started_at: now,
            last_update: now,
            retry_count: 0,
        }
    }

    pub fn percent_complete(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.downloaded_bytes as f64 / total as f64) * 100.0)
    }

    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = (self.last_update - self.started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            self.downloaded_bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Fetches files over HTTP(S).
pub struct HttpFetcher {
    config: ClientConfig,
}

impl HttpFetcher {
    /// Create the capability. Fails when the default client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        build_client(&config, &FetchOptions::default())?;
        Ok(Self { config })
    }

    /// Download `url` into `final_path` with retry and resumption.
    async fn download(
        &self,
        client: &Client,
        url: &str,
        final_path: &Path,
        query_head: bool,
        options: &FetchOptions,
    ) -> Result<PathBuf> {
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = partial_path(final_path);
        if !options.resume && fs::try_exists(&temp_path).await? {
            debug!(path = %temp_path.display(), "Discarding stale partial download");
            fs::remove_file(&temp_path).await?;
        }

        let resume_from = file_len(&temp_path).await?;
        let mut progress = DownloadProgress::new(url, resume_from);

        if options.quiet {
            debug!(url = %url, path = %final_path.display(), resume_from, "Starting download");
        } else {
            info!(url = %url, path = %final_path.display(), resume_from, "Starting download");
        }

        let mut attempt = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            let result = match self
                .download_with_resume(client, url, &temp_path, query_head, &mut progress, options)
                .await
            {
                Ok(()) => verify_size(&temp_path, &progress).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    // Move to final location (use copy+delete for cross-filesystem support)
                    if fs::rename(&temp_path, final_path).await.is_err() {
                        fs::copy(&temp_path, final_path).await?;
                        fs::remove_file(&temp_path).await?;
                    }

                    info!(
                        path = %final_path.display(),
                        bytes = progress.downloaded_bytes,
                        "Download completed"
                    );
                    return Ok(final_path.to_path_buf());
                }
                Err(e) => {
                    if !e.is_transient() {
                        return Err(e);
                    }

                    attempt += 1;
                    progress.retry_count = attempt;
                    if attempt > self.config.max_retries {
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }

                    warn!(
                        error = %e,
                        retry = attempt,
                        max_retries = self.config.max_retries,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// Download with HTTP Range support for resumption.
    async fn download_with_resume(
        &self,
        client: &Client,
        url: &str,
        temp_path: &Path,
        query_head: bool,
        progress: &mut DownloadProgress,
        options: &FetchOptions,
    ) -> Result<()> {
        // Drive hands out one-shot URLs, so only send HEAD to ordinary hosts
        if query_head && progress.total_bytes.is_none() {
            progress.total_bytes = self.content_length(client, url).await.unwrap_or(None);
        }
        let supports_range = if query_head {
            self.check_range_support(client, url).await.unwrap_or(false)
        } else {
            true
        };

        // Loop to handle RANGE_NOT_SATISFIABLE retry without recursion
        loop {
            let resume_from = file_len(temp_path).await?;

            // If we already have all the bytes, we're done
            if let Some(total) = progress.total_bytes {
                if resume_from > 0 && resume_from >= total {
                    progress.downloaded_bytes = total;
                    return Ok(());
                }
            }

            let mut request = client.get(url);

            if resume_from > 0 && supports_range {
                info!(
                    resume_from = resume_from,
                    total = ?progress.total_bytes,
                    "Resuming download"
                );
                request = request.header(header::RANGE, format!("bytes={}-", resume_from));
                progress.downloaded_bytes = resume_from;
            } else if resume_from > 0 {
                warn!("Server does not support range requests, restarting download");
                fs::remove_file(temp_path).await.ok();
                progress.downloaded_bytes = 0;
            }

            let response = request.send().await?;

            match response.status() {
                StatusCode::OK => {
                    // Full content, start from scratch
                    if resume_from > 0 {
                        fs::remove_file(temp_path).await.ok();
                        progress.downloaded_bytes = 0;
                    }
                }
                StatusCode::PARTIAL_CONTENT => {
                    debug!("Received partial content, resuming download");
                }
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    if let Some(total) = progress.total_bytes {
                        if resume_from >= total {
                            return Ok(());
                        }
                    }
                    // Otherwise, start over
                    fs::remove_file(temp_path).await.ok();
                    progress.downloaded_bytes = 0;
                    continue;
                }
                status if !status.is_success() => {
                    return Err(FetchError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                _ => {}
            }

            if progress.total_bytes.is_none() {
                let offset = if response.status() == StatusCode::PARTIAL_CONTENT {
                    resume_from
                } else {
                    0
                };
                progress.total_bytes = header_u64(&response, header::CONTENT_LENGTH)
                    .map(|len| len + offset);
            }

            return self
                .stream_to_file(response, temp_path, progress, options)
                .await;
        }
    }

    /// Stream response body to file with progress updates and rate limiting.
    async fn stream_to_file(
        &self,
        response: Response,
        path: &Path,
        progress: &mut DownloadProgress,
        options: &FetchOptions,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let speed = options.speed.filter(|s| *s > 0.0);
        let started = Instant::now();
        let mut transferred = 0u64;
        let mut bytes_since_update = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;

            let len = chunk.len() as u64;
            transferred += len;
            bytes_since_update += len;
            progress.downloaded_bytes += len;
            progress.last_update = Utc::now();

            let delay = speed.and_then(|s| throttle_delay(transferred, s, started.elapsed()));
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if bytes_since_update >= self.config.progress_interval {
                bytes_since_update = 0;
                log_progress(progress, options.quiet);
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Follow Drive confirmation pages until a response carries the file.
    ///
    /// Returns the URL to download and the server-provided file name.
    async fn resolve_drive(&self, client: &Client, url: &str) -> Result<(String, Option<String>)> {
        let mut current = url.to_string();

        for _ in 0..MAX_DRIVE_HOPS {
            let response = client.get(&current).send().await?;
            if !response.status().is_success() {
                return Err(FetchError::HttpStatus {
                    url: current,
                    status: response.status().as_u16(),
                });
            }

            if let Some(disposition) = header_str(&response, header::CONTENT_DISPOSITION) {
                return Ok((current, drive::content_disposition_filename(&disposition)));
            }

            let is_html = header_str(&response, header::CONTENT_TYPE)
                .map(|ct| ct.starts_with("text/html"))
                .unwrap_or(false);
            if !is_html {
                return Ok((current, None));
            }

            let page = response.text().await?;
            current = drive::confirmation_url(&page)?;
            debug!(url = %current, "Following Drive confirmation page");
        }

        Err(FetchError::DriveRetrieval(format!(
            "no file after {} confirmation pages",
            MAX_DRIVE_HOPS
        )))
    }

    /// Get content length with HEAD request.
    async fn content_length(&self, client: &Client, url: &str) -> Result<Option<u64>> {
        let response = client.head(url).send().await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        Ok(header_u64(&response, header::CONTENT_LENGTH))
    }

    /// Check if server supports HTTP Range requests.
    async fn check_range_support(&self, client: &Client, url: &str) -> Result<bool> {
        let response = client.head(url).send().await?;

        if !response.status().is_success() {
            return Ok(false);
        }

        if let Some(accept_ranges) = header_str(&response, header::ACCEPT_RANGES) {
            return Ok(accept_ranges != "none");
        }

        // Assume support if header is missing (many servers don't send it)
        Ok(true)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, options), fields(url = %url))]
    async fn fetch(&self, url: &str, output: &Path, options: &FetchOptions) -> Result<PathBuf> {
        let client = build_client(&self.config, options)?;

        let drive_url = drive::resolve_download_url(url, options.fuzzy).or_else(|| {
            drive::parse_link(url)
                .filter(|link| link.is_download_link)
                .map(|_| url.to_string())
        });

        let (source_url, remote_name, is_drive) = match drive_url {
            Some(drive_url) => {
                let (resolved, name) = self.resolve_drive(&client, &drive_url).await?;
                (resolved, name, true)
            }
            None => (url.to_string(), None, false),
        };

        let target = if is_directory_target(output) {
            let name = remote_name
                .or_else(|| if is_drive { None } else { url_basename(&source_url) })
                .ok_or_else(|| FetchError::MissingOutput(url.to_string()))?;
            output.join(name)
        } else {
            output.to_path_buf()
        };

        self.download(&client, &source_url, &target, !is_drive, options)
            .await
    }
}

/// Build a client honoring the per-download transfer options.
fn build_client(config: &ClientConfig, options: &FetchOptions) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .cookie_store(options.use_cookies)
        .tcp_nodelay(true);

    if let Some(proxy) = &options.proxy {
        let proxy = Proxy::all(proxy.as_str())
            .map_err(|e| FetchError::config(format!("invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    match &options.verify {
        TlsVerify::Flag(true) => {}
        TlsVerify::Flag(false) => {
            builder = builder.danger_accept_invalid_certs(true);
        }
        TlsVerify::CaBundle(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                FetchError::config(format!("cannot read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                FetchError::config(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
    }

    builder
        .build()
        .map_err(|e| FetchError::config(format!("failed to create HTTP client: {}", e)))
}

/// `<output>.part`, the file data streams into before the final rename.
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

fn is_directory_target(output: &Path) -> bool {
    output.is_dir()
        || output
            .as_os_str()
            .to_str()
            .map(|s| s.ends_with('/') || s.ends_with(std::path::MAIN_SEPARATOR))
            .unwrap_or(false)
}

async fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

async fn verify_size(temp_path: &Path, progress: &DownloadProgress) -> Result<()> {
    let Some(expected) = progress.total_bytes else {
        return Ok(());
    };
    let actual = file_len(temp_path).await?;
    if actual == expected {
        return Ok(());
    }
    if actual > expected {
        // Cannot be resumed from; start the next attempt clean
        fs::remove_file(temp_path).await.ok();
    }
    Err(FetchError::SizeMismatch { expected, actual })
}

fn header_str(response: &Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_u64(response: &Response, name: header::HeaderName) -> Option<u64> {
    header_str(response, name).and_then(|s| s.parse().ok())
}

fn log_progress(progress: &DownloadProgress, quiet: bool) {
    let percent = progress
        .percent_complete()
        .map(|p| format!("{:.1}%", p))
        .unwrap_or_else(|| "?".to_string());
    let speed = format!("{:.1} KB/s", progress.bytes_per_second() / 1024.0);
    if quiet {
        debug!(downloaded = progress.downloaded_bytes, total = ?progress.total_bytes, percent, speed, "Download progress");
    } else {
        info!(downloaded = progress.downloaded_bytes, total = ?progress.total_bytes, percent, speed, "Download progress");
    }
}

/// Pause needed so that `transferred` bytes take at least `transferred / speed`
/// seconds, capped at [`MAX_THROTTLE_SLEEP`].
fn throttle_delay(transferred: u64, speed: f64, elapsed: Duration) -> Option<Duration> {
    let expected = Duration::try_from_secs_f64(transferred as f64 / speed).unwrap_or(Duration::MAX);
    expected
        .checked_sub(elapsed)
        .filter(|delay| !delay.is_zero())
        .map(|delay| delay.min(MAX_THROTTLE_SLEEP))
}
