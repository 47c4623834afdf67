//! Georeferencing metadata: affine transforms, CRS and compression.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::RasterError;

/// Pixel-to-world affine transform in rasterio order.
///
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform mapping a `width x height` grid onto the bounds.
    pub fn from_bounds(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self::new(
            (east - west) / width as f64,
            0.0,
            west,
            0.0,
            (south - north) / height as f64,
            north,
        )
    }

    /// True when the transform has no rotation or shear terms.
    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// World coordinates of the pixel corner `(col, row)`.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Row-major 4x4 matrix as stored in the ModelTransformation tag.
    pub fn to_model_transformation(&self) -> [f64; 16] {
        [
            self.a, self.b, 0.0, self.c, //
            self.d, self.e, 0.0, self.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    pub fn from_model_transformation(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 8 {
            return None;
        }
        Some(Self::new(
            matrix[0], matrix[1], matrix[3], matrix[4], matrix[5], matrix[7],
        ))
    }

    /// Transform from ModelPixelScale and a ModelTiepoint anchored at any
    /// raster position.
    pub fn from_scale_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Some(Self::new(
            scale[0],
            0.0,
            x - i * scale[0],
            0.0,
            -scale[1],
            y + j * scale[1],
        ))
    }
}

/// Coordinate reference system identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Geographic (lat/lon) systems live in the 4000 range.
    pub fn is_geographic(&self) -> bool {
        (4000..5000).contains(&self.epsg)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// TIFF strip compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Deflate,
    Lzw,
    PackBits,
    /// Recognized when reading, never written.
    Jpeg,
}

impl Compression {
    pub fn tiff_code(self) -> u16 {
        match self {
            Self::None => 1,
            Self::Lzw => 5,
            Self::Jpeg => 7,
            Self::Deflate => 8,
            Self::PackBits => 32773,
        }
    }

    pub fn from_tiff_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::None),
            5 => Some(Self::Lzw),
            6 | 7 => Some(Self::Jpeg),
            8 | 32946 => Some(Self::Deflate),
            32773 => Some(Self::PackBits),
            _ => None,
        }
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
            Self::Lzw => "lzw",
            Self::PackBits => "packbits",
            Self::Jpeg => "jpeg",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Self::None),
            "deflate" | "zlib" => Ok(Self::Deflate),
            "lzw" => Ok(Self::Lzw),
            "packbits" => Ok(Self::PackBits),
            "jpeg" => Ok(Self::Jpeg),
            other => Err(RasterError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Raster profile read from or written to a GeoTIFF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMetadata {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub dtype: DType,
    pub crs: Option<Crs>,
    pub transform: Option<Affine>,
    pub compression: Compression,
}
