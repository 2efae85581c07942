//! Source image loading, downscaling and color-frequency pre-analysis

use crate::io::error::Result;
use crate::io::image::{ScaleAlgorithm, load_image};
use crate::math::color::Rgb;
use image::{DynamicImage, RgbaImage, imageops};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Dimensions after shrinking so the longer side is at most `max_side`
///
/// Images already within the bound keep their size; shrunk sides never drop
/// below one pixel.
pub fn downscaled_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width, height);
    }
    let scale = |side: u32| {
        let scaled = u64::from(side) * u64::from(max_side) / u64::from(longest);
        (scaled as u32).max(1)
    };
    (scale(width), scale(height))
}

/// The downscaled source; each pixel becomes one mosaic cell
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    /// Load `path` and shrink it so its longer side is at most `max_side`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded
    pub fn load(path: &Path, max_side: u32, scale: ScaleAlgorithm) -> Result<Self> {
        let image = load_image(path)?;
        let source = Self::from_image(&image, max_side, scale);
        info!(
            path = %path.display(),
            original = %format!("{}x{}", image.width(), image.height()),
            cells = %format!("{}x{}", source.width(), source.height()),
            "source image loaded"
        );
        Ok(source)
    }

    /// Shrink an already decoded image
    pub fn from_image(image: &DynamicImage, max_side: u32, scale: ScaleAlgorithm) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = downscaled_dimensions(rgba.width(), rgba.height(), max_side);
        let pixels = if (width, height) == rgba.dimensions() {
            rgba
        } else {
            imageops::resize(&rgba, width, height, scale.filter())
        };
        Self { pixels }
    }

    /// Width in cells
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in cells
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Color of the cell at (`x`, `y`), ignoring alpha
    pub fn color_at(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixels
            .get_pixel_checked(x, y)
            .map(|pixel| Rgb::from_rgba(pixel.0))
    }

    /// Every cell in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, Rgb)> + '_ {
        self.pixels
            .enumerate_pixels()
            .map(|(x, y, pixel)| (x, y, Rgb::from_rgba(pixel.0)))
    }

    /// Number of cells of each distinct color
    pub fn color_frequencies(&self) -> HashMap<Rgb, u32> {
        let mut frequencies = HashMap::new();
        for (_, _, color) in self.cells() {
            *frequencies.entry(color).or_insert(0) += 1;
        }
        frequencies
    }

    /// Colors occurring at least `threshold` times, most frequent first
    ///
    /// Equal counts are ordered by color so the result is deterministic.
    pub fn frequent_colors(&self, threshold: u32) -> Vec<(Rgb, u32)> {
        let mut frequent: Vec<(Rgb, u32)> = self
            .color_frequencies()
            .into_iter()
            .filter(|&(_, count)| count >= threshold)
            .collect();
        frequent.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        frequent
    }
}
