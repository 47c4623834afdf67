//! Flat (non georeferenced) image reading and writing.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, Pixel, Rgb, RgbImage, Rgba};
use ndarray::Array3;

use crate::array::RasterArray;
use crate::error::{RasterError, Result};

/// JPEG quality used when none is requested.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encoder choices for flat images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageSaveOptions {
    /// Output format; taken from the file extension when `None`.
    pub format: Option<ImageFormat>,
    /// JPEG quality in `1..=100`.
    pub jpeg_quality: Option<u8>,
}

/// Decode any supported image into an RGB `u8` array of shape `(H, W, 3)`.
pub fn load_rgb(path: &Path) -> Result<RasterArray> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let array = Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())?;
    Ok(RasterArray::from(array))
}

/// Convert an array into an image.
///
/// Accepts `(H, W)` and `(H, W, 1|3|4)` shapes as grayscale, RGB and RGBA.
/// `u8` and `u16` arrays map to 8/16-bit images, `f32` arrays with 3 or 4
/// channels to floating point RGB(A).
pub fn to_dynamic_image(array: &RasterArray) -> Result<DynamicImage> {
    array.ensure_raster_shape()?;
    let (width, height) = (array.width() as u32, array.height() as u32);
    let channels = array.band_count();
    let unsupported = || {
        RasterError::UnsupportedDtype(format!(
            "{} with {} channel(s) cannot be encoded as an image; cast to uint8 first",
            array.dtype(),
            channels
        ))
    };

    let image = match (array, channels) {
        (RasterArray::U8(a), 1) => DynamicImage::ImageLuma8(buffer(width, height, a.iter())?),
        (RasterArray::U8(a), 3) => DynamicImage::ImageRgb8(buffer(width, height, a.iter())?),
        (RasterArray::U8(a), 4) => DynamicImage::ImageRgba8(buffer(width, height, a.iter())?),
        (RasterArray::U16(a), 1) => DynamicImage::ImageLuma16(buffer(width, height, a.iter())?),
        (RasterArray::U16(a), 3) => DynamicImage::ImageRgb16(buffer(width, height, a.iter())?),
        (RasterArray::U16(a), 4) => DynamicImage::ImageRgba16(buffer(width, height, a.iter())?),
        (RasterArray::F32(a), 3) => DynamicImage::ImageRgb32F(buffer(width, height, a.iter())?),
        (RasterArray::F32(a), 4) => DynamicImage::ImageRgba32F(buffer(width, height, a.iter())?),
        _ => return Err(unsupported()),
    };
    Ok(image)
}

fn buffer<'a, P>(
    width: u32,
    height: u32,
    values: impl Iterator<Item = &'a P::Subpixel>,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
    P::Subpixel: 'a,
{
    let data: Vec<P::Subpixel> = values.copied().collect();
    ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| RasterError::Image("pixel buffer does not match dimensions".to_string()))
}

/// Write an array as a flat image. The format follows `options.format` or
/// the file extension.
pub fn save_image(array: &RasterArray, path: &Path, options: &ImageSaveOptions) -> Result<()> {
    let image = to_dynamic_image(array)?;
    let format = match options.format {
        Some(format) => format,
        None => ImageFormat::from_path(path)?,
    };

    match format {
        ImageFormat::Jpeg => {
            let quality = options.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100);
            let rgb = flatten_on_white(&image);
            let mut writer = BufWriter::new(File::create(path)?);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder.encode(&rgb, rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
        other => image.save_with_format(path, other)?,
    }
    Ok(())
}

/// JPEG has no alpha channel: composite onto white and drop to 8-bit RGB.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};
    use tempfile::TempDir;

    #[test]
    fn test_load_rgb_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.png");
        test_utils::write_rgb_image(&path, 5, 3).unwrap();

        let array = load_rgb(&path).unwrap();
        assert_eq!(array.shape(), &[3, 5, 3]);
        assert_eq!(array.dtype(), crate::dtype::DType::U8);
        assert_eq!(array.as_array::<u8>().unwrap()[[2, 4, 1]], 20);
    }

    #[test]
    fn test_png_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let array = RasterArray::from(test_utils::create_rgb_cube(6, 4));

        save_image(&array, &path, &ImageSaveOptions::default()).unwrap();
        assert_eq!(load_rgb(&path).unwrap(), array);
    }

    #[test]
    fn test_jpeg_with_alpha_and_quality() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        let array = RasterArray::from(Array3::<u8>::from_elem((4, 4, 4), 200));

        let options = ImageSaveOptions {
            format: None,
            jpeg_quality: Some(50),
        };
        save_image(&array, &path, &options).unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), 4);
        assert!(!loaded.color().has_alpha());
    }

    #[test]
    fn test_explicit_format_overrides_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let array = RasterArray::from(arr2(&[[0u8, 255], [128, 64]]));

        let options = ImageSaveOptions {
            format: Some(ImageFormat::Png),
            jpeg_quality: None,
        };
        save_image(&array, &path, &options).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let loaded = image::load_from_memory(&bytes).unwrap().to_luma8();
        assert_eq!(loaded.get_pixel(1, 0).0, [255]);
    }

    #[test]
    fn test_unsupported_dtype() {
        let array = RasterArray::from(arr2(&[[1.0f64, 2.0]]));
        assert!(matches!(
            to_dynamic_image(&array),
            Err(RasterError::UnsupportedDtype(_))
        ));
    }
}
