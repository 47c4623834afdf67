//! Array to raster conversion.
//!
//! This crate turns numeric arrays into georeferenced GeoTIFF files or flat
//! images:
//!
//! - [`save_geotiff`] writes an array on a synthetic grid anchored at the origin
//! - [`array_to_image`] copies georeferencing from a reference raster and
//!   infers the narrowest dtype for the value range
//! - [`npz_to_geotiff`] exports every time step of an `.npz` time series
//!
//! Arrays carry their element type at runtime as a [`RasterArray`].
//!
//! # Example
//!
//! ```ignore
//! use raster_io::{save_geotiff, RasterArray, DEFAULT_EPSG, DEFAULT_RESOLUTION};
//!
//! let array = RasterArray::from(ndarray::Array3::<u8>::zeros((128, 128, 3)));
//! save_geotiff(&array, "out.tif".as_ref(), DEFAULT_RESOLUTION, DEFAULT_EPSG, None)?;
//! ```

pub mod array;
pub mod dtype;
pub mod error;
pub mod geo;
pub mod geotiff;
pub mod image_io;
pub mod npz;
pub mod writer;

pub use array::{RasterArray, Sample};
pub use dtype::{infer_dtype, DType};
pub use error::{RasterError, Result};
pub use geo::{Affine, Compression, Crs, GeoMetadata};
pub use geotiff::{read_geotiff, read_metadata, write_geotiff, GeoTiffProfile};
pub use image_io::{load_rgb, save_image, ImageSaveOptions};
pub use npz::{list_arrays, npz_to_geotiff, read_npy, read_npz};
pub use writer::{array_to_image, save_geotiff, ArrayInput, DEFAULT_EPSG, DEFAULT_RESOLUTION};

pub use image::ImageFormat;
