//! Utilities around the Earthformer EarthNet workflow.
//!
//! - Fetching datasets and checkpoints ([`Downloader`], re-exported from
//!   `fetcher`)
//! - Writing predictions as GeoTIFFs ([`save_geotiff`], [`array_to_image`],
//!   [`npz_to_geotiff`], re-exported from `raster-io`)
//! - Viewing images and arrays ([`display::show_image`])
//! - Locating bundled resources ([`resources::earthnet_config_path`])

pub mod display;
pub mod error;
pub mod resources;

pub use display::{show_image, ColorMap, DisplayOptions, FileViewer, ImageSource, SystemViewer, Viewer};
pub use error::{EarthformerError, Result};
pub use resources::{
    earthnet_config_path, load_earthnet_config, package_dir, EarthnetConfig, PACKAGE_NAME,
};

pub use fetcher::{
    github_raw_url, ClientConfig, Downloader, FetchError, FetchOptions, Fetcher, Source, TlsVerify,
};
pub use raster_io::{
    array_to_image, npz_to_geotiff, save_geotiff, ArrayInput, Compression, DType, ImageSaveOptions,
    RasterArray, RasterError, DEFAULT_EPSG, DEFAULT_RESOLUTION,
};
