//! Earthformer command line tool.
//!
//! Wraps the download, raster conversion, display and resource helpers:
//! - `download` / `download-batch` fetch URLs, GitHub links and Google Drive
//!   files, optionally extracting archives
//! - `save-geotiff`, `array-to-image` and `npz-to-geotiff` convert arrays
//! - `show` renders an image or array and opens it
//! - `pkg-dir` and `earthnet-config` locate bundled resources

mod config;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use earthformer::{
    display::{self, ColorMap, DisplayOptions, FileViewer, ImageSource, SystemViewer},
    resources,
};
use fetcher::{Downloader, Source};
use raster_io::{
    array_to_image, load_rgb, npz_to_geotiff, read_npy, read_npz, save_geotiff, ArrayInput,
    Compression, DType, ImageFormat, ImageSaveOptions, RasterArray, DEFAULT_EPSG,
    DEFAULT_RESOLUTION,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use config::FetchArgs;

#[derive(Parser, Debug)]
#[command(name = "earthformer")]
#[command(about = "Download, convert and view Earthformer data")]
struct Args {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "EARTHFORMER_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "EARTHFORMER_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download one file
    Download {
        /// URL, or Google Drive file id with --drive-id
        source: String,

        /// Output file or directory (default: the URL's file name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat SOURCE as a Google Drive file id
        #[arg(long)]
        drive_id: bool,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Download several URLs into one directory
    DownloadBatch {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory (default: current directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Comma separated file names, one per URL
        #[arg(long, value_delimiter = ',')]
        filenames: Option<Vec<String>>,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Write an .npy/.npz array or an image as a GeoTIFF
    SaveGeotiff {
        input: PathBuf,
        output: PathBuf,

        /// Array name inside an .npz file
        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
        resolution: f64,

        #[arg(long, default_value_t = DEFAULT_EPSG)]
        epsg: u32,

        /// Output data type, e.g. uint8 or float32
        #[arg(long)]
        dtype: Option<DType>,
    },

    /// Write an array or image, georeferenced like a reference raster
    ArrayToImage {
        input: PathBuf,
        output: PathBuf,

        /// Raster to copy CRS, transform and compression from
        #[arg(long)]
        reference: Option<PathBuf>,

        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        dtype: Option<DType>,

        /// none, deflate, lzw, packbits, or "inherit" to use the reference's
        #[arg(long, default_value = "deflate")]
        compress: String,

        /// Image format for non-GeoTIFF output (default: from extension)
        #[arg(long)]
        format: Option<String>,

        /// JPEG quality 1-100
        #[arg(long)]
        quality: Option<u8>,
    },

    /// Export every time step of an .npz time series as a GeoTIFF
    NpzToGeotiff {
        input: PathBuf,

        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
        resolution: f64,

        #[arg(long, default_value_t = DEFAULT_EPSG)]
        epsg: u32,
    },

    /// Render an image, URL or array and open it
    Show {
        /// Path, http(s) URL, or .npy/.npz array
        source: String,

        #[arg(long)]
        key: Option<String>,

        /// Figure width and height in inches
        #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [12.0, 10.0])]
        figsize: Vec<f32>,

        #[arg(long, default_value = "100")]
        dpi: u32,

        /// gray, viridis, magma or jet
        #[arg(long)]
        cmap: Option<ColorMap>,

        /// Draw a frame with tick marks
        #[arg(long)]
        axis: bool,

        /// Write the figure to this PNG instead of opening a viewer
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Print the directory of a package's bundled resources
    PkgDir {
        #[arg(default_value = resources::PACKAGE_NAME)]
        name: String,
    },

    /// Print the bundled EarthNet config path, or its contents as JSON
    EarthnetConfig {
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    match args.command {
        Command::Download {
            source,
            output,
            drive_id,
            fetch,
        } => {
            let options = fetch.fetch_options()?;
            let downloader = Downloader::http(fetch.client_config())?;
            let source = if drive_id {
                Source::drive_id(source)
            } else {
                Source::url(source)
            };
            let path = downloader
                .download_file(&source, output.as_deref(), &options)
                .await
                .context("Download failed")?;
            println!("{}", path.display());
        }

        Command::DownloadBatch {
            urls,
            out_dir,
            filenames,
            fetch,
        } => {
            let options = fetch.fetch_options()?;
            let downloader = Downloader::http(fetch.client_config())?;
            let paths = downloader
                .download_files(&urls, out_dir.as_deref(), filenames.as_deref(), &options)
                .await
                .context("Batch download failed")?;
            for path in paths {
                println!("{}", path.display());
            }
        }

        Command::SaveGeotiff {
            input,
            output,
            key,
            resolution,
            epsg,
            dtype,
        } => {
            let array = load_array(&input, key.as_deref())?;
            let meta = save_geotiff(&array, &output, resolution, epsg, dtype)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(bands = meta.bands, dtype = %meta.dtype, "Done");
            println!("{}", output.display());
        }

        Command::ArrayToImage {
            input,
            output,
            reference,
            key,
            dtype,
            compress,
            format,
            quality,
        } => {
            let input = if is_array_file(&input) {
                ArrayInput::Array(load_array(&input, key.as_deref())?)
            } else {
                ArrayInput::ImagePath(input)
            };
            let save = ImageSaveOptions {
                format: format.as_deref().map(parse_image_format).transpose()?,
                jpeg_quality: quality,
            };
            let path = array_to_image(
                input,
                &output,
                reference.as_deref(),
                dtype,
                parse_compression(&compress)?,
                &save,
            )
            .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("{}", path.display());
        }

        Command::NpzToGeotiff {
            input,
            out_dir,
            key,
            resolution,
            epsg,
        } => {
            let paths = npz_to_geotiff(&input, out_dir.as_deref(), key.as_deref(), resolution, epsg)
                .with_context(|| format!("Failed to export {}", input.display()))?;
            for path in paths {
                println!("{}", path.display());
            }
        }

        Command::Show {
            source,
            key,
            figsize,
            dpi,
            cmap,
            axis,
            save,
            fetch,
        } => {
            let options = DisplayOptions {
                figsize: (figsize[0], figsize[1]),
                dpi,
                cmap,
                axis,
            };
            let source = if is_array_file(Path::new(&source)) {
                ImageSource::InMemory(load_array(Path::new(&source), key.as_deref())?)
            } else {
                ImageSource::parse(&source)
            };
            let downloader = Downloader::http(fetch.client_config())?;

            match save {
                Some(path) => {
                    display::show_image(source, &options, &downloader, &FileViewer::new(path))
                        .await?
                }
                None => {
                    display::show_image(source, &options, &downloader, &SystemViewer::new())
                        .await?
                }
            }
        }

        Command::PkgDir { name } => {
            println!("{}", resources::package_dir(&name)?.display());
        }

        Command::EarthnetConfig { show } => {
            if show {
                let config = resources::load_earthnet_config()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", resources::earthnet_config_path()?.display());
            }
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn is_array_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("npy") | Some("npz")
    )
}

/// Load `.npy`/`.npz` arrays directly and anything else as an RGB image.
fn load_array(path: &Path, key: Option<&str>) -> Result<RasterArray> {
    let array = match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => read_npy(path)?,
        Some("npz") => read_npz(path, key)?.1,
        _ => load_rgb(path)?,
    };
    Ok(array)
}

fn parse_compression(value: &str) -> Result<Option<Compression>> {
    if value.eq_ignore_ascii_case("inherit") {
        return Ok(None);
    }
    Ok(Some(value.parse::<Compression>()?))
}

fn parse_image_format(value: &str) -> Result<ImageFormat> {
    match ImageFormat::from_extension(value) {
        Some(format) => Ok(format),
        None => bail!("Unknown image format '{}'", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_download() {
        let args = Args::parse_from([
            "earthformer",
            "download",
            "https://host/data.zip",
            "-o",
            "data/data.zip",
            "--subfolder",
            "--speed",
            "1024",
        ]);
        match args.command {
            Command::Download { output, fetch, .. } => {
                assert_eq!(output, Some(PathBuf::from("data/data.zip")));
                let options = fetch.fetch_options().unwrap();
                assert!(options.subfolder);
                assert_eq!(options.speed, Some(1024.0));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_batch_filenames() {
        let args = Args::parse_from([
            "earthformer",
            "download-batch",
            "https://a/x",
            "https://b/y",
            "--filenames",
            "one.bin,two.bin",
        ]);
        match args.command {
            Command::DownloadBatch { urls, filenames, .. } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(filenames.unwrap(), vec!["one.bin", "two.bin"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_typed_values() {
        let args = Args::parse_from([
            "earthformer",
            "save-geotiff",
            "in.npy",
            "out.tif",
            "--dtype",
            "float16",
        ]);
        match args.command {
            Command::SaveGeotiff {
                dtype, resolution, epsg, ..
            } => {
                assert_eq!(dtype, Some(DType::F16));
                assert_eq!(resolution, DEFAULT_RESOLUTION);
                assert_eq!(epsg, DEFAULT_EPSG);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_compression() {
        assert_eq!(parse_compression("inherit").unwrap(), None);
        assert_eq!(parse_compression("lzw").unwrap(), Some(Compression::Lzw));
        assert!(parse_compression("brotli").is_err());
    }

    #[test]
    fn test_array_file_detection() {
        assert!(is_array_file(Path::new("cube.npz")));
        assert!(is_array_file(Path::new("a/b.npy")));
        assert!(!is_array_file(Path::new("photo.png")));
    }
}
