//! Single-file and batch download pipelines.
//!
//! The pipeline owns the policy around a transfer (default names, skip when
//! present, link normalization, extraction) and hands the transfer itself to
//! the injected [`Fetcher`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{info, instrument};

use crate::download::HttpFetcher;
use crate::drive;
use crate::error::{FetchError, Result};
use crate::extract::{extract_archive, extraction_target, ArchiveKind};
use crate::fetch::Fetcher;
use crate::options::{ClientConfig, FetchOptions, Source};
use crate::url::{github_raw_url, is_drive_file_link, url_basename};

/// Downloads files through a fetch capability.
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Downloader backed by the HTTP capability.
    pub fn http(config: ClientConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpFetcher::new(config)?)))
    }

    /// Download one file, optionally extracting it.
    ///
    /// `output` defaults to the URL's basename, or to the current directory
    /// when no name can be taken from the source. Returns the absolute path
    /// of the file, or of the extraction directory when `subfolder` is set.
    #[instrument(skip(self, options))]
    pub async fn download_file(
        &self,
        source: &Source,
        output: Option<&Path>,
        options: &FetchOptions,
    ) -> Result<PathBuf> {
        let output = match output {
            Some(path) => path.to_path_buf(),
            None => default_output(source),
        };
        let output = std::path::absolute(&output)?;

        let out_dir = if output.is_dir() {
            output.clone()
        } else {
            output.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        fs::create_dir_all(&out_dir).await?;

        let mut options = options.clone();
        let url = match source {
            Source::Url(url) => {
                if output.is_file() && !options.overwrite {
                    info!(
                        path = %output.display(),
                        "File already exists, skipping download. Set overwrite to replace it"
                    );
                    return Ok(output);
                }
                github_raw_url(url).into_owned()
            }
            Source::DriveId(id) => {
                options.fuzzy = true;
                drive::download_url(id)
            }
        };

        if is_drive_file_link(&url) {
            options.fuzzy = true;
        }

        let fetched = self.fetcher.fetch(&url, &output, &options).await?;
        let fetched = std::path::absolute(&fetched)?;

        if options.unzip {
            if let Some(kind) = ArchiveKind::from_path(&fetched) {
                let target = extraction_target(&fetched, kind, options.subfolder);
                let archive = fetched.clone();
                let dest = target.clone();
                tokio::task::spawn_blocking(move || extract_archive(&archive, kind, &dest))
                    .await
                    .map_err(|e| FetchError::extract(&fetched, e))??;

                if options.subfolder {
                    return Ok(target);
                }
            }
        }

        Ok(fetched)
    }

    /// Download several URLs into one directory, one after another.
    ///
    /// `out_dir` defaults to the current working directory and `filenames`
    /// to each URL's basename. The first failure aborts the batch.
    #[instrument(skip_all, fields(count = urls.len()))]
    pub async fn download_files(
        &self,
        urls: &[String],
        out_dir: Option<&Path>,
        filenames: Option<&[String]>,
        options: &FetchOptions,
    ) -> Result<Vec<PathBuf>> {
        let out_dir = match out_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };

        if let Some(names) = filenames {
            if names.len() != urls.len() {
                return Err(FetchError::invalid_request(format!(
                    "{} filenames given for {} urls",
                    names.len(),
                    urls.len()
                )));
            }
        }

        let mut paths = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let output = match filenames {
                Some(names) => out_dir.join(&names[index]),
                None => match url_basename(url) {
                    Some(name) => out_dir.join(name),
                    None => out_dir.clone(),
                },
            };

            let path = self
                .download_file(&Source::url(url.as_str()), Some(&output), options)
                .await?;
            paths.push(path);
        }

        Ok(paths)
    }
}

fn default_output(source: &Source) -> PathBuf {
    match source {
        Source::Url(url) if url.starts_with("http") && drive::parse_link(url).is_none() => {
            url_basename(url)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
        }
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(&Source::url("https://host/path/data.zip?x=1")),
            PathBuf::from("data.zip")
        );
        assert_eq!(
            default_output(&Source::url("https://host/path/")),
            PathBuf::from(".")
        );
        assert_eq!(
            default_output(&Source::url("https://drive.google.com/file/d/1AbC/view")),
            PathBuf::from(".")
        );
        assert_eq!(default_output(&Source::drive_id("1AbC")), PathBuf::from("."));
    }
}
