//! Dynamically typed n-dimensional arrays.
//!
//! Numeric archives and images carry their element type at runtime, so a
//! [`RasterArray`] keeps one `ndarray` per supported element type and
//! dispatches generic helpers over the variants.

use ndarray::{Array, ArrayD, Axis, Dimension, IxDyn, Slice};
use ndarray_npy::ReadableElement;
use num_traits::AsPrimitive;

use crate::dtype::DType;
use crate::error::{RasterError, Result};

/// Element types a [`RasterArray`] can hold.
pub trait Sample:
    Copy + PartialOrd + AsPrimitive<f64> + ReadableElement + Send + Sync + 'static
{
    const DTYPE: DType;

    fn into_raster(array: ArrayD<Self>) -> RasterArray;

    fn from_raster(raster: &RasterArray) -> Option<&ArrayD<Self>>;

    /// Append the native-endian encoding of `self`.
    fn push_ne_bytes(self, out: &mut Vec<u8>);

    /// Decode one sample from the front of `bytes`.
    fn from_bytes(bytes: &[u8], little_endian: bool) -> Self;
}

macro_rules! impl_sample {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const DTYPE: DType = DType::$variant;

                fn into_raster(array: ArrayD<Self>) -> RasterArray {
                    RasterArray::$variant(array)
                }

                fn from_raster(raster: &RasterArray) -> Option<&ArrayD<Self>> {
                    match raster {
                        RasterArray::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn push_ne_bytes(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn from_bytes(bytes: &[u8], little_endian: bool) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    if little_endian {
                        <$ty>::from_le_bytes(buf)
                    } else {
                        <$ty>::from_be_bytes(buf)
                    }
                }
            }
        )*
    };
}

impl_sample!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// An owned array tagged with its element type.
///
/// 2-D arrays are one band, 3-D arrays are `height x width x band`.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterArray {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    U64(ArrayD<u64>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Run `$body` with `$array` bound to the inner array of any variant.
macro_rules! dispatch {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            RasterArray::U8($array) => $body,
            RasterArray::I8($array) => $body,
            RasterArray::U16($array) => $body,
            RasterArray::I16($array) => $body,
            RasterArray::U32($array) => $body,
            RasterArray::I32($array) => $body,
            RasterArray::U64($array) => $body,
            RasterArray::I64($array) => $body,
            RasterArray::F32($array) => $body,
            RasterArray::F64($array) => $body,
        }
    };
}

/// Convert `$array` to the storage type of `$dtype`.
macro_rules! cast_to {
    ($array:expr, $dtype:expr) => {
        match $dtype.storage() {
            DType::U8 => RasterArray::U8($array.mapv(|v| AsPrimitive::<u8>::as_(v))),
            DType::I8 => RasterArray::I8($array.mapv(|v| AsPrimitive::<i8>::as_(v))),
            DType::U16 => RasterArray::U16($array.mapv(|v| AsPrimitive::<u16>::as_(v))),
            DType::I16 => RasterArray::I16($array.mapv(|v| AsPrimitive::<i16>::as_(v))),
            DType::U32 => RasterArray::U32($array.mapv(|v| AsPrimitive::<u32>::as_(v))),
            DType::I32 => RasterArray::I32($array.mapv(|v| AsPrimitive::<i32>::as_(v))),
            DType::U64 => RasterArray::U64($array.mapv(|v| AsPrimitive::<u64>::as_(v))),
            DType::I64 => RasterArray::I64($array.mapv(|v| AsPrimitive::<i64>::as_(v))),
            DType::F16 | DType::F32 => {
                RasterArray::F32($array.mapv(|v| AsPrimitive::<f32>::as_(v)))
            }
            DType::F64 => RasterArray::F64($array.mapv(|v| AsPrimitive::<f64>::as_(v))),
        }
    };
}

impl RasterArray {
    /// Wrap a typed array of any dimensionality.
    pub fn from_array<T: Sample, D: Dimension>(array: Array<T, D>) -> Self {
        T::into_raster(array.into_dyn())
    }

    pub fn from_shape_vec<T: Sample>(shape: &[usize], data: Vec<T>) -> Result<Self> {
        Ok(T::into_raster(ArrayD::from_shape_vec(IxDyn(shape), data)?))
    }

    /// Borrow the inner array when it holds `T`.
    pub fn as_array<T: Sample>(&self) -> Option<&ArrayD<T>> {
        T::from_raster(self)
    }

    pub fn dtype(&self) -> DType {
        dispatch!(self, array => dtype_of(array))
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail unless the array is a single band (2-D) or a band stack (3-D).
    pub fn ensure_raster_shape(&self) -> Result<()> {
        match self.ndim() {
            2 | 3 if !self.is_empty() => Ok(()),
            2 | 3 => Err(RasterError::invalid_shape(self.shape(), "array is empty")),
            _ => Err(RasterError::invalid_shape(
                self.shape(),
                "array must be 2D or 3D",
            )),
        }
    }

    pub fn height(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.shape().get(1).copied().unwrap_or(0)
    }

    /// Number of raster bands: 1 for 2-D arrays, the last axis for 3-D.
    pub fn band_count(&self) -> usize {
        match self.shape() {
            [_, _, bands] => *bands,
            _ => 1,
        }
    }

    /// Smallest and largest value as `f64`.
    ///
    /// Any NaN makes both bounds NaN. `None` for empty arrays.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        dispatch!(self, array => min_max_of(array))
    }

    /// Element-wise conversion with `as` semantics. `F16` produces `F32`.
    pub fn cast(&self, dtype: DType) -> RasterArray {
        if self.dtype() == dtype.storage() {
            return self.clone();
        }
        dispatch!(self, array => cast_to!(array, dtype))
    }

    /// One band as a 2-D array.
    pub fn band(&self, index: usize) -> Result<RasterArray> {
        if index >= self.band_count() {
            return Err(RasterError::invalid_shape(
                self.shape(),
                format!("band {} out of range", index),
            ));
        }
        if self.ndim() == 2 {
            return Ok(self.clone());
        }
        Ok(dispatch!(self, array => band_of(array, index)))
    }

    /// Channels `0..channels` of step `step` from a `(H, W, C, N)` array.
    pub fn time_slice(&self, step: usize, channels: usize) -> Result<RasterArray> {
        match self.shape() {
            [_, _, c, n] if channels <= *c && step < *n => {
                Ok(dispatch!(self, array => time_slice_of(array, step, channels)))
            }
            _ => Err(RasterError::invalid_shape(
                self.shape(),
                format!(
                    "expected (height, width, >={} channels, >{} steps)",
                    channels, step
                ),
            )),
        }
    }

    /// All values converted to `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        dispatch!(self, array => array.mapv(|v| v.as_()))
    }

    /// Append every value in logical (row, column, band) order as
    /// native-endian bytes. This is TIFF's chunky pixel layout.
    pub fn write_ne_bytes(&self, out: &mut Vec<u8>) {
        dispatch!(self, array => {
            out.reserve(array.len() * self.dtype().size());
            for value in array.iter() {
                value.push_ne_bytes(out);
            }
        })
    }

    /// Build an array of `dtype` from packed sample bytes.
    pub fn from_bytes(
        dtype: DType,
        shape: &[usize],
        bytes: &[u8],
        little_endian: bool,
    ) -> Result<RasterArray> {
        match dtype {
            DType::U8 => decode::<u8>(shape, bytes, little_endian),
            DType::I8 => decode::<i8>(shape, bytes, little_endian),
            DType::U16 => decode::<u16>(shape, bytes, little_endian),
            DType::I16 => decode::<i16>(shape, bytes, little_endian),
            DType::U32 => decode::<u32>(shape, bytes, little_endian),
            DType::I32 => decode::<i32>(shape, bytes, little_endian),
            DType::U64 => decode::<u64>(shape, bytes, little_endian),
            DType::I64 => decode::<i64>(shape, bytes, little_endian),
            DType::F32 => decode::<f32>(shape, bytes, little_endian),
            DType::F64 => decode::<f64>(shape, bytes, little_endian),
            DType::F16 => Err(RasterError::UnsupportedDtype(
                "float16 samples cannot be decoded".to_string(),
            )),
        }
    }
}

impl<T: Sample, D: Dimension> From<Array<T, D>> for RasterArray {
    fn from(array: Array<T, D>) -> Self {
        Self::from_array(array)
    }
}

fn dtype_of<T: Sample>(_: &ArrayD<T>) -> DType {
    T::DTYPE
}

fn min_max_of<T: Sample>(array: &ArrayD<T>) -> Option<(f64, f64)> {
    let mut values = array.iter().map(|v| -> f64 { v.as_() });
    let first = values.next()?;
    let mut bounds = (first, first);
    for value in values {
        if value.is_nan() || bounds.0.is_nan() {
            bounds = (f64::NAN, f64::NAN);
            continue;
        }
        bounds.0 = bounds.0.min(value);
        bounds.1 = bounds.1.max(value);
    }
    Some(bounds)
}

fn band_of<T: Sample>(array: &ArrayD<T>, index: usize) -> RasterArray {
    T::into_raster(array.index_axis(Axis(2), index).to_owned())
}

fn time_slice_of<T: Sample>(array: &ArrayD<T>, step: usize, channels: usize) -> RasterArray {
    let slice = array.index_axis(Axis(3), step);
    T::into_raster(
        slice
            .slice_axis(Axis(2), Slice::from(..channels))
            .to_owned(),
    )
}

fn decode<T: Sample>(shape: &[usize], bytes: &[u8], little_endian: bool) -> Result<RasterArray> {
    let size = T::DTYPE.size();
    let count: usize = shape.iter().product();
    if bytes.len() < count * size {
        return Err(RasterError::invalid_shape(
            shape,
            format!("{} bytes cannot hold {} samples", bytes.len(), count),
        ));
    }
    let values: Vec<T> = bytes
        .chunks_exact(size)
        .take(count)
        .map(|chunk| T::from_bytes(chunk, little_endian))
        .collect();
    RasterArray::from_shape_vec(shape, values)
}
