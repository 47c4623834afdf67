//! Test data generators for synthetic raster arrays.
//!
//! These generators create predictable, verifiable patterns that can be used
//! across the test suite.

use ndarray::{Array2, Array3, Array4};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that `grid[[row, col]] == col * 1000 + row`.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.dim(), (5, 10));
/// assert_eq!(grid[[0, 1]], 1000.0); // col=1, row=0
/// assert_eq!(grid[[1, 0]], 1.0);    // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(row, col)| (col * 1000 + row) as f32)
}

/// Creates a `height x width x bands` cube where each value encodes its
/// position as `band * 10_000 + row * 100 + col`.
pub fn create_band_cube(width: usize, height: usize, bands: usize) -> Array3<f64> {
    Array3::from_shape_fn((height, width, bands), |(row, col, band)| {
        (band * 10_000 + row * 100 + col) as f64
    })
}

/// Creates an RGB-like `u8` image cube with a gradient in each channel.
pub fn create_rgb_cube(width: usize, height: usize) -> Array3<u8> {
    Array3::from_shape_fn((height, width, 3), |(row, col, band)| match band {
        0 => (col * 255 / width.max(1)) as u8,
        1 => (row * 255 / height.max(1)) as u8,
        _ => ((row + col) % 256) as u8,
    })
}

/// Creates a reflectance-like time series `(height, width, channels, steps)`
/// with values in `[0, 1)` encoding `(channel, step)`.
pub fn create_time_series(
    width: usize,
    height: usize,
    channels: usize,
    steps: usize,
) -> Array4<f32> {
    Array4::from_shape_fn((height, width, channels, steps), |(row, col, channel, step)| {
        let base = (channel * 100 + step) as f32 / 10_000.0;
        base + (row * width + col) as f32 / 1_000_000.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_encoding() {
        let grid = create_test_grid(4, 3);
        assert_eq!(grid.dim(), (3, 4));
        assert_eq!(grid[[2, 3]], 3002.0);
    }

    #[test]
    fn test_band_cube_encoding() {
        let cube = create_band_cube(5, 4, 3);
        assert_eq!(cube.dim(), (4, 5, 3));
        assert_eq!(cube[[1, 2, 2]], 20_102.0);
    }

    #[test]
    fn test_time_series_in_unit_range() {
        let series = create_time_series(3, 2, 4, 5);
        assert!(series.iter().all(|v| (0.0..1.0).contains(v)));
    }
}
