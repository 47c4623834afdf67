//! GeoTIFF encoding and decoding.
//!
//! Files are written through the `tiff` crate's low-level directory encoder so
//! that any band count and sample type can be stored with chunky (pixel
//! interleaved) strips. Georeferencing uses the ModelPixelScale/ModelTiepoint
//! pair for north-up grids and ModelTransformation otherwise, plus a minimal
//! GeoKeyDirectory carrying the EPSG code.
//!
//! Gray and RGB files are decoded by the `tiff` crate. It has no color type
//! for other band counts, so those strips are inflated here; PackBits is not
//! available on that path.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::compression::{
    CompressionAlgorithm, Compressor, Deflate, Lzw, Packbits, Uncompressed,
};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::{debug, instrument};

use crate::array::RasterArray;
use crate::dtype::DType;
use crate::error::{RasterError, Result};
use crate::geo::{Affine, Compression, Crs, GeoMetadata};

// GeoTIFF tag ids
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

// GeoKey ids and values
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;

/// Target uncompressed strip size.
const STRIP_TARGET_BYTES: usize = 64 * 1024;

/// Georeferencing and encoding choices for a GeoTIFF file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeoTiffProfile {
    pub crs: Option<Crs>,
    pub transform: Option<Affine>,
    pub compression: Compression,
}

/// Write a 2-D (single band) or 3-D (`height x width x band`) array.
#[instrument(skip(array, profile), fields(path = %path.display(), dtype = %array.dtype()))]
pub fn write_geotiff(
    path: &Path,
    array: &RasterArray,
    profile: &GeoTiffProfile,
) -> Result<GeoMetadata> {
    array.ensure_raster_shape()?;
    if !profile.compression.is_writable() {
        return Err(RasterError::UnsupportedCompression(format!(
            "{} cannot be used for writing",
            profile.compression
        )));
    }

    let (width, height, bands) = (array.width(), array.height(), array.band_count());
    let dtype = array.dtype();
    let samples_per_pixel = u16::try_from(bands)
        .map_err(|_| RasterError::invalid_shape(array.shape(), "too many bands for TIFF"))?;

    let mut pixels = Vec::new();
    array.write_ne_bytes(&mut pixels);

    let row_bytes = width * bands * dtype.size();
    let rows_per_strip = (STRIP_TARGET_BYTES / row_bytes).clamp(1, height);
    let mut compressor = compressor(profile.compression)?;
    let strips = pixels
        .chunks(rows_per_strip * row_bytes)
        .map(|strip| compress_strip(strip, &mut compressor))
        .collect::<Result<Vec<_>>>()?;

    let mut writer = BufWriter::new(File::create(path)?);
    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        let mut dir = encoder.new_directory()?;

        dir.write_tag(Tag::ImageWidth, to_u32(width)?)?;
        dir.write_tag(Tag::ImageLength, to_u32(height)?)?;

        let bits = vec![(dtype.size() * 8) as u16; bands];
        dir.write_tag(Tag::BitsPerSample, bits.as_slice())?;
        dir.write_tag(Tag::SamplesPerPixel, samples_per_pixel)?;
        let formats = vec![dtype.tiff_sample_format(); bands];
        dir.write_tag(Tag::SampleFormat, formats.as_slice())?;
        dir.write_tag(Tag::Compression, profile.compression.tiff_code())?;

        let rgb = bands == 3 && matches!(dtype, DType::U8 | DType::U16);
        if rgb {
            dir.write_tag(Tag::PhotometricInterpretation, PHOTOMETRIC_RGB)?;
        } else {
            dir.write_tag(Tag::PhotometricInterpretation, PHOTOMETRIC_BLACK_IS_ZERO)?;
            if bands > 1 {
                let extra = vec![0u16; bands - 1];
                dir.write_tag(Tag::ExtraSamples, extra.as_slice())?;
            }
        }
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        dir.write_tag(Tag::RowsPerStrip, to_u32(rows_per_strip)?)?;

        write_geo_tags(&mut dir, profile)?;

        let mut offsets = Vec::with_capacity(strips.len());
        let mut byte_counts = Vec::with_capacity(strips.len());
        for strip in &strips {
            let offset = dir.write_data(strip.as_slice())?;
            offsets.push(u32::try_from(offset).map_err(|_| {
                RasterError::Tiff("file exceeds the 4 GiB classic TIFF limit".to_string())
            })?);
            byte_counts.push(to_u32(strip.len())?);
        }
        dir.write_tag(Tag::StripOffsets, offsets.as_slice())?;
        dir.write_tag(Tag::StripByteCounts, byte_counts.as_slice())?;

        dir.finish()?;
    }
    writer.flush()?;

    debug!(
        width,
        height,
        bands,
        strips = strips.len(),
        compression = %profile.compression,
        "Encoded GeoTIFF"
    );

    Ok(GeoMetadata {
        width,
        height,
        bands,
        dtype,
        crs: profile.crs,
        transform: profile.transform,
        compression: profile.compression,
    })
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<W, K>,
    profile: &GeoTiffProfile,
) -> Result<()> {
    if let Some(t) = profile.transform {
        if t.is_north_up() {
            let scale = [t.a, -t.e, 0.0];
            dir.write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), scale.as_slice())?;
            let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
            dir.write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), tiepoint.as_slice())?;
        } else {
            let matrix = t.to_model_transformation();
            dir.write_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION), matrix.as_slice())?;
        }
    }

    if let Some(crs) = profile.crs {
        let keys = geo_key_directory(crs)?;
        dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), keys.as_slice())?;
    }

    Ok(())
}

/// `[version, revision, minor, count, (key, location, count, value)...]`
fn geo_key_directory(crs: Crs) -> Result<Vec<u16>> {
    let code = u16::try_from(crs.epsg)
        .map_err(|_| RasterError::metadata(format!("{} does not fit a GeoKey", crs)))?;

    let (model, key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
    };

    Ok(vec![
        1, 1, 0, 3, //
        GT_MODEL_TYPE_GEO_KEY, 0, 1, model, //
        GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA, //
        key, 0, 1, code,
    ])
}

fn compressor(compression: Compression) -> Result<Compressor> {
    Ok(match compression {
        Compression::None => Compressor::Uncompressed(Uncompressed),
        Compression::Deflate => Compressor::Deflate(Deflate::default()),
        Compression::Lzw => Compressor::Lzw(Lzw),
        Compression::PackBits => Compressor::Packbits(Packbits),
        Compression::Jpeg => {
            return Err(RasterError::UnsupportedCompression(
                "jpeg cannot be used for writing".to_string(),
            ))
        }
    })
}

fn compress_strip(strip: &[u8], compressor: &mut Compressor) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(strip.len());
    compressor.write_to(&mut out, strip)?;
    Ok(out)
}

/// Strip decoding for band layouts the `tiff` decoder has no color type for.
fn decompress_strip(data: &[u8], compression: Compression, expected: usize) -> Result<Vec<u8>> {
    let mut bytes = match compression {
        Compression::None => data.to_vec(),
        Compression::Deflate => {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::with_capacity(expected);
            decoder.read_to_end(&mut out)?;
            out
        }
        Compression::Lzw => {
            let mut decoder =
                weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            decoder
                .decode(data)
                .map_err(|e| RasterError::Tiff(format!("LZW decoding failed: {}", e)))?
        }
        other => {
            return Err(RasterError::UnsupportedCompression(format!(
                "{} strips with more than one band outside an RGB layout",
                other
            )))
        }
    };

    if bytes.len() < expected {
        return Err(RasterError::Tiff(format!(
            "strip decoded to {} bytes, expected {}",
            bytes.len(),
            expected
        )));
    }
    bytes.truncate(expected);
    Ok(bytes)
}

/// Read dimensions, sample type, georeferencing and compression.
pub fn read_metadata(path: &Path) -> Result<GeoMetadata> {
    let mut decoder = open_decoder(path)?;
    read_directory_metadata(&mut decoder)
}

/// Read a stripped GeoTIFF into an array plus its metadata.
///
/// Single-band files produce a 2-D array, multi-band files a 3-D one.
#[instrument(fields(path = %path.display()))]
pub fn read_geotiff(path: &Path) -> Result<(RasterArray, GeoMetadata)> {
    let mut decoder = open_decoder(path)?;
    let meta = read_directory_metadata(&mut decoder)?;
    let shape: Vec<usize> = if meta.bands == 1 {
        vec![meta.height, meta.width]
    } else {
        vec![meta.height, meta.width, meta.bands]
    };

    let array = if decoder.colortype().is_ok() {
        decoded_to_raster(decoder.read_image()?, &shape)?
    } else {
        debug!(bands = meta.bands, "Decoding strips for a multi-band layout");
        read_chunky_strips(path, &mut decoder, &meta, &shape)?
    };
    Ok((array, meta))
}

fn decoded_to_raster(result: DecodingResult, shape: &[usize]) -> Result<RasterArray> {
    match result {
        DecodingResult::U8(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::I8(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::U16(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::I16(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::U32(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::I32(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::U64(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::I64(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::F32(data) => RasterArray::from_shape_vec(shape, data),
        DecodingResult::F64(data) => RasterArray::from_shape_vec(shape, data),
    }
}

/// Pixel-interleaved strips with any band count, as written by [`write_geotiff`].
fn read_chunky_strips<R: Read + Seek>(
    path: &Path,
    decoder: &mut Decoder<R>,
    meta: &GeoMetadata,
    shape: &[usize],
) -> Result<RasterArray> {
    let planar = find_u32(decoder, Tag::PlanarConfiguration)?.unwrap_or(1);
    if planar != 1 {
        return Err(RasterError::Tiff("planar band layout is not supported".to_string()));
    }
    let predictor = find_u32(decoder, Tag::Predictor)?.unwrap_or(1);
    if predictor != 1 {
        return Err(RasterError::Tiff(format!(
            "predictor {} is not supported",
            predictor
        )));
    }

    let offsets = decoder
        .find_tag(Tag::StripOffsets)?
        .ok_or_else(|| RasterError::Tiff("tiled layout is not supported".to_string()))?
        .into_u64_vec()?;
    let byte_counts = decoder
        .find_tag(Tag::StripByteCounts)?
        .ok_or_else(|| RasterError::Tiff("missing StripByteCounts".to_string()))?
        .into_u64_vec()?;
    let rows_per_strip = find_u32(decoder, Tag::RowsPerStrip)?
        .map(|rows| (rows as usize).min(meta.height))
        .unwrap_or(meta.height)
        .max(1);

    let little_endian = read_byte_order(path)?;
    let row_bytes = meta.width * meta.bands * meta.dtype.size();
    let total = row_bytes * meta.height;
    let mut pixels = Vec::with_capacity(total);
    let mut file = BufReader::new(File::open(path)?);

    for (index, (offset, count)) in offsets.iter().zip(&byte_counts).enumerate() {
        let first_row = index * rows_per_strip;
        if first_row >= meta.height {
            break;
        }
        let rows = rows_per_strip.min(meta.height - first_row);

        let mut raw = vec![0u8; *count as usize];
        file.seek(SeekFrom::Start(*offset))?;
        file.read_exact(&mut raw)?;
        pixels.extend(decompress_strip(&raw, meta.compression, rows * row_bytes)?);
    }

    if pixels.len() < total {
        return Err(RasterError::Tiff(format!(
            "strips hold {} bytes, expected {}",
            pixels.len(),
            total
        )));
    }

    RasterArray::from_bytes(meta.dtype, shape, &pixels, little_endian)
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = BufReader::new(File::open(path)?);
    Ok(Decoder::new(file)?.with_limits(Limits::unlimited()))
}

fn read_byte_order(path: &Path) -> Result<bool> {
    let mut header = [0u8; 2];
    File::open(path)?.read_exact(&mut header)?;
    match &header {
        b"II" => Ok(true),
        b"MM" => Ok(false),
        _ => Err(RasterError::Tiff(format!(
            "{} is not a TIFF file",
            path.display()
        ))),
    }
}

fn read_directory_metadata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoMetadata> {
    let (width, height) = decoder.dimensions()?;

    let bands = find_u32(decoder, Tag::SamplesPerPixel)?.unwrap_or(1) as usize;
    let bits = find_u16_vec(decoder, Tag::BitsPerSample)?.unwrap_or_else(|| vec![1]);
    let formats = find_u16_vec(decoder, Tag::SampleFormat)?.unwrap_or_else(|| vec![1]);
    if bits.is_empty() || formats.is_empty() {
        return Err(RasterError::metadata("empty BitsPerSample or SampleFormat"));
    }

    if bits.iter().any(|b| *b != bits[0]) || formats.iter().any(|f| *f != formats[0]) {
        return Err(RasterError::UnsupportedDtype(
            "bands with mixed sample types".to_string(),
        ));
    }
    let dtype = DType::from_tiff(formats[0], bits[0]).ok_or_else(|| {
        RasterError::UnsupportedDtype(format!(
            "sample format {} with {} bits",
            formats[0], bits[0]
        ))
    })?;

    let code = find_u32(decoder, Tag::Compression)?.unwrap_or(1);
    let compression = u16::try_from(code)
        .ok()
        .and_then(Compression::from_tiff_code)
        .ok_or_else(|| RasterError::UnsupportedCompression(format!("TIFF code {}", code)))?;

    let transform = match find_f64_vec(decoder, TAG_MODEL_TRANSFORMATION)? {
        Some(matrix) => Affine::from_model_transformation(&matrix),
        None => {
            let scale = find_f64_vec(decoder, TAG_MODEL_PIXEL_SCALE)?;
            let tiepoint = find_f64_vec(decoder, TAG_MODEL_TIEPOINT)?;
            match (scale, tiepoint) {
                (Some(scale), Some(tiepoint)) => Affine::from_scale_tiepoint(&scale, &tiepoint),
                _ => None,
            }
        }
    };

    let crs = find_u16_vec(decoder, Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))?
        .and_then(|keys| parse_geo_keys(&keys));

    Ok(GeoMetadata {
        width: width as usize,
        height: height as usize,
        bands,
        dtype,
        crs,
        transform,
        compression,
    })
}

/// EPSG code from the projected or geographic CRS key.
fn parse_geo_keys(keys: &[u16]) -> Option<Crs> {
    let count = *keys.get(3)? as usize;
    let mut projected = None;
    let mut geographic = None;

    for entry in keys.get(4..)?.chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }

    projected
        .or(geographic)
        .map(|code| Crs::from_epsg(u32::from(code)))
}

fn find_u32<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<u32>> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_u32()).transpose()?)
}

/// SHORT or LONG values of `tag`; a single value may decode as either.
fn find_u16_vec<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<u16>>> {
    let values = match decoder.find_tag(tag)? {
        None => return Ok(None),
        Some(Value::Short(value)) => return Ok(Some(vec![value])),
        Some(value) => value.into_u32_vec()?,
    };
    values
        .into_iter()
        .map(|v| {
            u16::try_from(v)
                .map_err(|_| RasterError::metadata(format!("{:?} value {} exceeds 16 bits", tag, v)))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn find_f64_vec<R: Read + Seek>(decoder: &mut Decoder<R>, tag: u16) -> Result<Option<Vec<f64>>> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(tag))?
        .map(|v| v.into_f64_vec())
        .transpose()?)
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| RasterError::Tiff(format!("{} exceeds TIFF limits", value)))
}
