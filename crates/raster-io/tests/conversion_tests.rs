//! Integration tests: arrays, images and NPZ bundles written as GeoTIFFs and
//! read back through the GeoTIFF reader.

use std::path::Path;

use ndarray::{arr2, Array2, Array3};
use raster_io::{
    array_to_image, npz_to_geotiff, read_geotiff, read_metadata, save_geotiff, write_geotiff,
    Affine, ArrayInput, Compression, Crs, DType, GeoTiffProfile, ImageSaveOptions, RasterArray,
    RasterError,
};
use tempfile::TempDir;
use test_utils::{assert_approx_eq, create_band_cube, create_test_grid, create_time_series};

/// Reference raster in UTM 33N with deflate compression.
fn write_reference(path: &Path) -> GeoTiffProfile {
    let profile = GeoTiffProfile {
        crs: Some(Crs::from_epsg(32633)),
        transform: Some(Affine::from_bounds(500_000.0, 4_000_000.0, 500_080.0, 4_000_060.0, 8, 6)),
        compression: Compression::Deflate,
    };
    let data = RasterArray::from(Array2::<u16>::zeros((6, 8)));
    write_geotiff(path, &data, &profile).unwrap();
    profile
}

#[test]
fn test_save_geotiff_2d_is_single_band() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.tif");
    let grid = RasterArray::from(create_test_grid(5, 4));

    save_geotiff(&grid, &path, 10.0, 3857, None).unwrap();

    let (read, meta) = read_geotiff(&path).unwrap();
    assert_eq!(meta.bands, 1);
    assert_eq!((meta.width, meta.height), (5, 4));
    assert_eq!(meta.dtype, DType::F32);
    assert_eq!(meta.crs, Some(Crs::from_epsg(3857)));
    assert_eq!(meta.compression, Compression::None);
    assert_eq!(read, grid);

    let transform = meta.transform.unwrap();
    assert_approx_eq!(transform.a, 10.0, 1e-9);
    assert_approx_eq!(transform.e, -10.0, 1e-9);
    assert_approx_eq!(transform.c, 0.0, 1e-9);
    assert_approx_eq!(transform.f, 40.0, 1e-9);
}

#[test]
fn test_save_geotiff_3d_writes_one_band_per_slice() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cube.tif");
    let cube = RasterArray::from(create_band_cube(6, 3, 4));

    save_geotiff(&cube, &path, 2.5, 4326, None).unwrap();

    let (read, meta) = read_geotiff(&path).unwrap();
    assert_eq!(meta.bands, 4);
    assert_eq!(meta.crs, Some(Crs::from_epsg(4326)));
    assert_eq!(read.band(3).unwrap(), cube.band(3).unwrap());
    assert_approx_eq!(meta.transform.unwrap().f, 7.5, 1e-9);
}

#[test]
fn test_save_geotiff_casts_and_widens_float16() {
    let dir = TempDir::new().unwrap();
    let cube = RasterArray::from(create_band_cube(2, 2, 2));

    let path = dir.path().join("u16.tif");
    save_geotiff(&cube, &path, 10.0, 3857, Some(DType::U16)).unwrap();
    assert_eq!(read_metadata(&path).unwrap().dtype, DType::U16);

    let path = dir.path().join("f16.tif");
    save_geotiff(&cube, &path, 10.0, 3857, Some(DType::F16)).unwrap();
    assert_eq!(read_metadata(&path).unwrap().dtype, DType::F32);
}

#[test]
fn test_save_geotiff_rejects_4d() {
    let dir = TempDir::new().unwrap();
    let series = RasterArray::from(create_time_series(2, 2, 3, 2));

    let result = save_geotiff(&series, &dir.path().join("x.tif"), 10.0, 3857, None);
    assert!(matches!(result, Err(RasterError::InvalidShape { .. })));
    assert!(!dir.path().join("x.tif").exists());
}

#[test]
fn test_array_to_image_copies_reference_profile() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("reference.tif");
    let profile = write_reference(&reference);

    let output = dir.path().join("prediction.tif");
    let reflectance = RasterArray::from(Array3::<f64>::from_elem((6, 8, 4), 0.25));
    array_to_image(
        ArrayInput::Array(reflectance),
        &output,
        Some(&reference),
        None,
        None,
        &ImageSaveOptions::default(),
    )
    .unwrap();

    let meta = read_metadata(&output).unwrap();
    assert_eq!(meta.crs, profile.crs);
    assert_eq!(meta.transform, profile.transform);
    assert_eq!(meta.compression, Compression::Deflate);
    // [0, 1] values infer float32
    assert_eq!(meta.dtype, DType::F32);
    assert_eq!(meta.bands, 4);
}

#[test]
fn test_array_to_image_infers_integer_dtypes() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("reference.tif");
    write_reference(&reference);

    let cases = [
        (arr2(&[[0.0f64, 200.0]]), DType::U8),
        (arr2(&[[-5.0f64, 100.0]]), DType::I8),
        (arr2(&[[0.0f64, 60_000.0]]), DType::U16),
        (arr2(&[[-1000.0f64, 1000.0]]), DType::I16),
        (arr2(&[[-1.0f64, 1e6]]), DType::F64),
    ];

    for (index, (values, expected)) in cases.into_iter().enumerate() {
        let output = dir.path().join(format!("case{}.tif", index));
        array_to_image(
            RasterArray::from(values).into(),
            &output,
            Some(&reference),
            None,
            Some(Compression::Lzw),
            &ImageSaveOptions::default(),
        )
        .unwrap();

        let meta = read_metadata(&output).unwrap();
        assert_eq!(meta.dtype, expected, "case {}", index);
        assert_eq!(meta.compression, Compression::Lzw);
    }
}

#[test]
fn test_array_to_image_explicit_dtype_wins() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("reference.tif");
    write_reference(&reference);

    let output = dir.path().join("explicit.tif");
    array_to_image(
        RasterArray::from(arr2(&[[0.5f32, 0.75]])).into(),
        &output,
        Some(&reference),
        Some(DType::F64),
        None,
        &ImageSaveOptions::default(),
    )
    .unwrap();
    assert_eq!(read_metadata(&output).unwrap().dtype, DType::F64);
}

#[test]
fn test_array_to_image_rejects_explicit_jpeg() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("reference.tif");
    write_reference(&reference);

    let result = array_to_image(
        RasterArray::from(arr2(&[[1u8]])).into(),
        &dir.path().join("out.tif"),
        Some(&reference),
        None,
        Some(Compression::Jpeg),
        &ImageSaveOptions::default(),
    );
    assert!(matches!(result, Err(RasterError::UnsupportedCompression(_))));
}

#[test]
fn test_array_to_image_from_image_path() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("reference.tif");
    write_reference(&reference);
    let source = dir.path().join("photo.png");
    test_utils::write_rgb_image(&source, 8, 6).unwrap();

    let output = dir.path().join("photo.tif");
    array_to_image(
        ArrayInput::ImagePath(source),
        &output,
        Some(&reference),
        None,
        None,
        &ImageSaveOptions::default(),
    )
    .unwrap();

    let (read, meta) = read_geotiff(&output).unwrap();
    assert_eq!(meta.bands, 3);
    assert_eq!(meta.dtype, DType::U8);
    assert_eq!(read.shape(), &[6, 8, 3]);
}

#[test]
fn test_array_to_image_without_reference_writes_flat_image() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("preview.png");
    let rgb = RasterArray::from(test_utils::create_rgb_cube(7, 5));

    array_to_image(
        rgb.clone().into(),
        &output,
        None,
        None,
        None,
        &ImageSaveOptions::default(),
    )
    .unwrap();

    assert_eq!(raster_io::load_rgb(&output).unwrap(), rgb);
}

#[test]
fn test_npz_to_geotiff_exports_each_step() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("cube.npz");
    let series = create_time_series(4, 3, 5, 12);
    test_utils::write_npz(&archive, &[("highresdynamic", &series)]).unwrap();

    let out_dir = dir.path().join("steps");
    let written = npz_to_geotiff(&archive, Some(&out_dir), None, 20.0, 3857).unwrap();

    assert_eq!(written.len(), 12);
    assert_eq!(written[0], out_dir.join("cube00.tif"));
    assert_eq!(written[11], out_dir.join("cube11.tif"));

    let (read, meta) = read_geotiff(&written[7]).unwrap();
    assert_eq!(meta.bands, 3);
    assert_eq!((meta.width, meta.height), (4, 3));
    let values = read.as_array::<f32>().unwrap();
    assert_eq!(values[[1, 2, 2]], series[[1, 2, 2, 7]]);
}

#[test]
fn test_npz_to_geotiff_defaults_to_archive_dir() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("sample.npz");
    let series = create_time_series(2, 2, 3, 3);
    test_utils::write_npz(&archive, &[("x", &series)]).unwrap();

    let written = npz_to_geotiff(&archive, None, Some("x"), 10.0, 3857).unwrap();
    assert_eq!(written, vec![
        dir.path().join("sample0.tif"),
        dir.path().join("sample1.tif"),
        dir.path().join("sample2.tif"),
    ]);
}

#[test]
fn test_single_band_reference_metadata_and_inheritance() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("reference.tif");
    let profile = write_reference(&reference);

    let meta = read_metadata(&reference).unwrap();
    assert_eq!((meta.width, meta.height, meta.bands), (8, 6, 1));
    assert_eq!(meta.dtype, DType::U16);
    assert_eq!(meta.crs, profile.crs);
    assert_eq!(meta.transform, profile.transform);

    let output = dir.path().join("mask.tif");
    let mask = RasterArray::from(Array2::<f64>::from_shape_fn((6, 8), |(r, c)| {
        ((r + c) % 2) as f64
    }));
    array_to_image(
        mask.clone().into(),
        &output,
        Some(&reference),
        None,
        None,
        &ImageSaveOptions::default(),
    )
    .unwrap();

    let (read, meta) = read_geotiff(&output).unwrap();
    assert_eq!(meta.bands, 1);
    assert_eq!(meta.compression, Compression::Deflate);
    assert_eq!(meta.crs, profile.crs);
    assert_eq!(read.shape(), &[6, 8]);
    assert_eq!(read.cast(DType::F64), mask);
}

#[test]
fn test_npz_to_geotiff_reads_deflated_archive() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("packed.npz");
    let series = create_time_series(4, 3, 4, 2);
    test_utils::write_npz_compressed(&archive, &[("highresdynamic", &series)]).unwrap();

    let written = npz_to_geotiff(&archive, None, None, 20.0, 3857).unwrap();
    assert_eq!(written.len(), 2);

    let (read, meta) = read_geotiff(&written[1]).unwrap();
    assert_eq!(meta.bands, 3);
    let values = read.as_array::<f32>().unwrap();
    assert_eq!(values[[2, 3, 1]], series[[2, 3, 1, 1]]);
}

#[test]
fn test_npz_to_geotiff_widens_half_floats() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("half.npz");
    // (height 2, width 2, channels 3, steps 1), exactly representable in f16
    let values: Vec<f32> = (0..12).map(|v| v as f32 * 0.25).collect();
    test_utils::write_npz_f16(&archive, "highresdynamic", &[2, 2, 3, 1], &values).unwrap();

    let written = npz_to_geotiff(&archive, None, None, 20.0, 3857).unwrap();
    assert_eq!(written.len(), 1);

    let (read, meta) = read_geotiff(&written[0]).unwrap();
    assert_eq!(meta.dtype, DType::F32);
    assert_eq!(meta.bands, 3);
    let read = read.as_array::<f32>().unwrap();
    assert_eq!(read[[0, 0, 0]], 0.0);
    assert_eq!(read[[1, 1, 2]], 2.75);
    assert_eq!(read[[0, 1, 1]], 1.0);
}
