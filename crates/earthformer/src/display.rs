//! Render arrays and images into a figure and hand it to a viewer.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use fetcher::{Downloader, FetchOptions, Source};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use raster_io::{load_rgb, RasterArray, RasterError};
use tracing::{debug, info, instrument};

use crate::error::{EarthformerError, Result};

/// Axes box as fractions of the figure: left, bottom, right, top.
const AXES_BOX: (f32, f32, f32, f32) = (0.125, 0.11, 0.9, 0.88);

/// Number of tick marks per axis.
const TICKS: u32 = 5;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// What to show.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    LocalPath(PathBuf),
    /// Fetched into the working directory first.
    RemoteUrl(String),
    InMemory(RasterArray),
}

impl ImageSource {
    /// `http(s)` strings become remote URLs, anything else a local path.
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http") {
            Self::RemoteUrl(source.to_string())
        } else {
            Self::LocalPath(PathBuf::from(source))
        }
    }
}

impl From<RasterArray> for ImageSource {
    fn from(array: RasterArray) -> Self {
        Self::InMemory(array)
    }
}

/// Figure layout and coloring.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    /// Width and height in inches.
    pub figsize: (f32, f32),
    pub dpi: u32,
    /// Colormap for single-band data; viridis when `None`.
    pub cmap: Option<ColorMap>,
    /// Draw a frame with tick marks.
    pub axis: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            figsize: (12.0, 10.0),
            dpi: 100,
            cmap: None,
            axis: false,
        }
    }
}

impl DisplayOptions {
    /// Figure size in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        let px = |inches: f32| ((inches * self.dpi as f32).round() as u32).max(1);
        (px(self.figsize.0), px(self.figsize.1))
    }
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }

    fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

fn interpolate_color(color1: Color, color2: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let t_inv = 1.0 - t;
    let mix = |a: u8, b: u8| ((a as f32 * t_inv) + (b as f32 * t)).round() as u8;

    Color {
        r: mix(color1.r, color2.r),
        g: mix(color1.g, color2.g),
        b: mix(color1.b, color2.b),
        a: mix(color1.a, color2.a),
    }
}

/// Colormaps for single-band data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMap {
    Gray,
    #[default]
    Viridis,
    Magma,
    Jet,
}

const GRAY_STOPS: &[(f32, Color)] = &[(0.0, Color::rgb(0, 0, 0)), (1.0, Color::rgb(255, 255, 255))];

const VIRIDIS_STOPS: &[(f32, Color)] = &[
    (0.0, Color::rgb(68, 1, 84)),
    (0.25, Color::rgb(59, 82, 139)),
    (0.5, Color::rgb(33, 145, 140)),
    (0.75, Color::rgb(94, 201, 98)),
    (1.0, Color::rgb(253, 231, 37)),
];

const MAGMA_STOPS: &[(f32, Color)] = &[
    (0.0, Color::rgb(0, 0, 4)),
    (0.2, Color::rgb(59, 15, 112)),
    (0.4, Color::rgb(140, 41, 129)),
    (0.6, Color::rgb(222, 73, 104)),
    (0.8, Color::rgb(254, 159, 109)),
    (1.0, Color::rgb(252, 253, 191)),
];

const JET_STOPS: &[(f32, Color)] = &[
    (0.0, Color::rgb(0, 0, 128)),
    (0.125, Color::rgb(0, 0, 255)),
    (0.375, Color::rgb(0, 255, 255)),
    (0.625, Color::rgb(255, 255, 0)),
    (0.875, Color::rgb(255, 0, 0)),
    (1.0, Color::rgb(128, 0, 0)),
];

impl ColorMap {
    fn stops(self) -> &'static [(f32, Color)] {
        match self {
            Self::Gray => GRAY_STOPS,
            Self::Viridis => VIRIDIS_STOPS,
            Self::Magma => MAGMA_STOPS,
            Self::Jet => JET_STOPS,
        }
    }

    /// Color for a normalized value. NaN is transparent.
    pub fn color(self, t: f32) -> Color {
        if t.is_nan() {
            return Color::transparent();
        }
        let t = t.clamp(0.0, 1.0);
        let stops = self.stops();
        for pair in stops.windows(2) {
            let ((t0, c0), (t1, c1)) = (pair[0], pair[1]);
            if t <= t1 {
                return interpolate_color(c0, c1, (t - t0) / (t1 - t0));
            }
        }
        stops[stops.len() - 1].1
    }
}

impl FromStr for ColorMap {
    type Err = EarthformerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gray" | "grey" => Ok(Self::Gray),
            "viridis" => Ok(Self::Viridis),
            "magma" => Ok(Self::Magma),
            "jet" => Ok(Self::Jet),
            other => Err(EarthformerError::Config(format!("unknown colormap '{}'", other))),
        }
    }
}

/// Convert an array into RGBA pixels.
///
/// Single-band data is stretched to its value range and colored through
/// `cmap`. Three or four channel data is shown as is: floats are expected in
/// `[0, 1]`, integers in `[0, 255]`, values outside are clipped.
pub fn array_to_rgba(array: &RasterArray, cmap: ColorMap) -> Result<RgbaImage> {
    array.ensure_raster_shape()?;
    let (width, height) = (array.width() as u32, array.height() as u32);
    let values = array.to_f64();

    match array.band_count() {
        1 => {
            let flat: Vec<f64> = values.iter().copied().collect();
            let (min, max) = finite_bounds(&flat).unwrap_or((0.0, 0.0));
            let range = max - min;
            Ok(RgbaImage::from_fn(width, height, |x, y| {
                let v = flat[(y * width + x) as usize];
                let t = if v.is_nan() {
                    f32::NAN
                } else if range > 0.0 {
                    ((v - min) / range) as f32
                } else {
                    0.0
                };
                cmap.color(t).to_rgba()
            }))
        }
        channels @ (3 | 4) => {
            let scale = if array.dtype().is_float() { 255.0 } else { 1.0 };
            let flat: Vec<f64> = values.iter().copied().collect();
            let to_u8 = |v: f64| (v * scale).clamp(0.0, 255.0).round() as u8;
            Ok(RgbaImage::from_fn(width, height, |x, y| {
                let base = (y * width + x) as usize * channels;
                let alpha = if channels == 4 { to_u8(flat[base + 3]) } else { 255 };
                Rgba([
                    to_u8(flat[base]),
                    to_u8(flat[base + 1]),
                    to_u8(flat[base + 2]),
                    alpha,
                ])
            }))
        }
        other => Err(RasterError::invalid_shape(
            array.shape(),
            format!("cannot display {} channels", other),
        )
        .into()),
    }
}

/// Value range ignoring NaN and infinities.
fn finite_bounds(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |bounds, v| match bounds {
            None => Some((v, v)),
            Some((lo, hi)) => Some((v.min(lo), v.max(hi))),
        })
}

/// Lay the image out on a white figure, aspect preserved, with an optional
/// frame and tick marks.
pub fn render_figure(array: &RasterArray, options: &DisplayOptions) -> Result<RgbaImage> {
    let image = array_to_rgba(array, options.cmap.unwrap_or_default())?;
    let (fig_w, fig_h) = options.pixel_size();
    let mut figure = RgbaImage::from_pixel(fig_w, fig_h, WHITE);

    let (left, bottom, right, top) = AXES_BOX;
    let box_x = fig_w as f32 * left;
    let box_y = fig_h as f32 * (1.0 - top);
    let box_w = fig_w as f32 * (right - left);
    let box_h = fig_h as f32 * (top - bottom);

    let scale = (box_w / image.width() as f32).min(box_h / image.height() as f32);
    let draw_w = ((image.width() as f32 * scale).round() as u32).max(1);
    let draw_h = ((image.height() as f32 * scale).round() as u32).max(1);
    let x0 = (box_x + (box_w - draw_w as f32) / 2.0).round() as i64;
    let y0 = (box_y + (box_h - draw_h as f32) / 2.0).round() as i64;

    let resized = imageops::resize(&image, draw_w, draw_h, FilterType::Nearest);
    imageops::overlay(&mut figure, &resized, x0, y0);

    if options.axis {
        draw_axes(&mut figure, x0 as i32, y0 as i32, draw_w, draw_h, options.dpi);
    }

    debug!(
        figure_width = fig_w,
        figure_height = fig_h,
        image_width = draw_w,
        image_height = draw_h,
        "Rendered figure"
    );
    Ok(figure)
}

fn draw_axes(figure: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, dpi: u32) {
    draw_hollow_rect_mut(figure, Rect::at(x - 1, y - 1).of_size(width + 2, height + 2), BLACK);

    let tick = (dpi as f32 * 0.05).max(2.0);
    let (left, top) = (x as f32 - 1.0, y as f32 - 1.0);
    let (right, bottom) = (left + width as f32 + 1.0, top + height as f32 + 1.0);

    for i in 0..TICKS {
        let frac = i as f32 / (TICKS - 1) as f32;
        let tx = left + frac * (right - left);
        draw_line_segment_mut(figure, (tx, bottom), (tx, bottom + tick), BLACK);
        let ty = top + frac * (bottom - top);
        draw_line_segment_mut(figure, (left - tick, ty), (left, ty), BLACK);
    }
}

/// Presents a rendered figure.
pub trait Viewer: Send + Sync {
    fn show(&self, figure: &RgbaImage) -> Result<()>;
}

/// Opens figures in the platform image viewer.
///
/// The figure is written to a temporary PNG that outlives the call so the
/// viewer process can read it. `VIEWER` overrides the command.
#[derive(Debug, Clone, Default)]
pub struct SystemViewer {
    command: Option<String>,
}

impl SystemViewer {
    pub fn new() -> Self {
        Self {
            command: std::env::var("VIEWER").ok().filter(|c| !c.is_empty()),
        }
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
        }
    }

    fn launch(&self, path: &Path) -> Result<()> {
        let mut command = match &self.command {
            Some(program) => Command::new(program),
            None if cfg!(target_os = "macos") => Command::new("open"),
            None if cfg!(target_os = "windows") => {
                let mut cmd = Command::new("cmd");
                cmd.args(["/C", "start", ""]);
                cmd
            }
            None => Command::new("xdg-open"),
        };
        command.arg(path);
        command
            .spawn()
            .map_err(|e| EarthformerError::viewer(format!("failed to launch viewer: {}", e)))?;
        Ok(())
    }
}

impl Viewer for SystemViewer {
    fn show(&self, figure: &RgbaImage) -> Result<()> {
        let file = tempfile::Builder::new()
            .prefix("earthformer-")
            .suffix(".png")
            .tempfile()?;
        let (_, path) = file.keep().map_err(|e| EarthformerError::viewer(e.error))?;
        figure
            .save(&path)
            .map_err(|e| EarthformerError::viewer(format!("failed to write figure: {}", e)))?;

        info!(path = %path.display(), "Opening figure");
        self.launch(&path)
    }
}

/// Writes figures to a PNG file.
#[derive(Debug, Clone)]
pub struct FileViewer {
    path: PathBuf,
}

impl FileViewer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Viewer for FileViewer {
    fn show(&self, figure: &RgbaImage) -> Result<()> {
        figure
            .save_with_format(&self.path, image::ImageFormat::Png)
            .map_err(|e| EarthformerError::viewer(format!("failed to write figure: {}", e)))?;
        info!(path = %self.path.display(), "Saved figure");
        Ok(())
    }
}

/// Load `source`, render it and pass the figure to `viewer`.
///
/// Remote sources are downloaded with default options first. Paths are
/// decoded as RGB.
#[instrument(skip_all)]
pub async fn show_image(
    source: ImageSource,
    options: &DisplayOptions,
    downloader: &Downloader,
    viewer: &dyn Viewer,
) -> Result<()> {
    let array = match source {
        ImageSource::InMemory(array) => array,
        ImageSource::LocalPath(path) => load_path(&path).await?,
        ImageSource::RemoteUrl(url) => {
            let path = downloader
                .download_file(&Source::url(url), None, &FetchOptions::default())
                .await?;
            load_path(&path).await?
        }
    };

    let options = options.clone();
    let figure = tokio::task::spawn_blocking(move || render_figure(&array, &options))
        .await
        .map_err(|e| EarthformerError::viewer(e))??;
    viewer.show(&figure)
}

async fn load_path(path: &Path) -> Result<RasterArray> {
    if !path.exists() {
        return Err(EarthformerError::PathNotFound(path.to_path_buf()));
    }
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_rgb(&path))
        .await
        .map_err(|e| EarthformerError::viewer(e))?
        .map_err(EarthformerError::from)
}
