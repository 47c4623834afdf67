//! Pixel data types and range-based dtype inference.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RasterError;

/// Element type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    /// Accepted as a request only; rasters store it as `F32`.
    F16,
    F32,
    F64,
}

impl DType {
    /// The type actually written. 16-bit floats are widened to 32-bit.
    pub fn storage(self) -> Self {
        match self {
            Self::F16 => Self::F32,
            other => other,
        }
    }

    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 | Self::F16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::F64)
    }

    /// TIFF SampleFormat: 1 unsigned, 2 signed, 3 IEEE float.
    pub fn tiff_sample_format(self) -> u16 {
        match self {
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => 1,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 2,
            Self::F16 | Self::F32 | Self::F64 => 3,
        }
    }

    /// Inverse of [`DType::tiff_sample_format`] plus bits per sample.
    pub fn from_tiff(sample_format: u16, bits: u16) -> Option<Self> {
        Some(match (sample_format, bits) {
            (1, 8) => Self::U8,
            (2, 8) => Self::I8,
            (1, 16) => Self::U16,
            (2, 16) => Self::I16,
            (1, 32) => Self::U32,
            (2, 32) => Self::I32,
            (1, 64) => Self::U64,
            (2, 64) => Self::I64,
            (3, 16) => Self::F16,
            (3, 32) => Self::F32,
            (3, 64) => Self::F64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
            Self::U64 => "uint64",
            Self::I64 => "int64",
            Self::F16 => "float16",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "uint8" | "u8" => Self::U8,
            "int8" | "i8" => Self::I8,
            "uint16" | "u16" => Self::U16,
            "int16" | "i16" => Self::I16,
            "uint32" | "u32" => Self::U32,
            "int32" | "i32" => Self::I32,
            "uint64" | "u64" => Self::U64,
            "int64" | "i64" => Self::I64,
            "float16" | "f16" => Self::F16,
            "float32" | "f32" => Self::F32,
            "float64" | "f64" => Self::F64,
            other => return Err(RasterError::UnsupportedDtype(other.to_string())),
        })
    }
}

/// Narrowest dtype able to hold values in `[min, max]`.
///
/// Bands are checked in order, first match wins:
/// `[0, 1]` float32, `[0, 255]` uint8, `[-128, 127]` int8,
/// `[0, 65535]` uint16, `[-32768, 32767]` int16, anything else float64.
/// NaN bounds fail every comparison and end up as float64.
pub fn infer_dtype(min: f64, max: f64) -> DType {
    if min >= 0.0 && max <= 1.0 {
        DType::F32
    } else if min >= 0.0 && max <= 255.0 {
        DType::U8
    } else if min >= -128.0 && max <= 127.0 {
        DType::I8
    } else if min >= 0.0 && max <= 65535.0 {
        DType::U16
    } else if min >= -32768.0 && max <= 32767.0 {
        DType::I16
    } else {
        DType::F64
    }
}
