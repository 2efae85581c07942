//! Tile decoding, center cropping, resampling and mosaic export

use crate::io::configuration::{JPEG_QUALITY, OutputFormat};
use crate::io::error::{MosaicError, Result, WithPath};
use crate::math::color::Rgb;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Resampling algorithm used for every resize in the pipeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ScaleAlgorithm {
    /// Nearest neighbor sampling, fastest and blockiest
    #[value(name = "nearest-neighbor")]
    NearestNeighbor,
    /// Linear interpolation
    #[value(name = "bilinear", alias = "approx-bilinear")]
    BiLinear,
    /// Cubic Catmull-Rom interpolation
    #[default]
    #[value(name = "catmull-rom")]
    CatmullRom,
    /// Gaussian smoothing
    #[value(name = "gaussian")]
    Gaussian,
    /// Lanczos with a window of 3, sharpest and slowest
    #[value(name = "lanczos3")]
    Lanczos3,
}

impl ScaleAlgorithm {
    /// The `image` filter implementing this algorithm
    pub const fn filter(self) -> FilterType {
        match self {
            Self::NearestNeighbor => FilterType::Nearest,
            Self::BiLinear => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Decode an image from raw file bytes, detecting the format from content
///
/// # Errors
///
/// Returns [`MosaicError::ImageLoad`] if the bytes are not a supported image
pub fn decode_image(bytes: &[u8], path: &Path) -> Result<DynamicImage> {
    image::load_from_memory(bytes).with_path(path)
}

/// Read and decode an image file
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).with_file_operation(path, "read image")?;
    decode_image(&bytes, path)
}

/// Crop the largest centered square out of an image
pub fn center_crop_square(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    if x == 0 && y == 0 && width == height {
        return image.clone();
    }
    imageops::crop_imm(image, x, y, side, side).to_image()
}

/// Center-crop a decoded tile to a square and shrink it to `pixel_size`
///
/// Tiles are never upscaled; a square smaller than the target is rejected.
///
/// # Errors
///
/// Returns [`MosaicError::TileTooSmall`] if the square crop is smaller than `pixel_size`
pub fn prepare_tile(
    image: &DynamicImage,
    pixel_size: u32,
    scale: ScaleAlgorithm,
    path: &Path,
) -> Result<RgbaImage> {
    let square = center_crop_square(&image.to_rgba8());
    let side = square.width();

    if side < pixel_size {
        return Err(MosaicError::TileTooSmall {
            path: path.to_path_buf(),
            side,
            required: pixel_size,
        });
    }

    if side > pixel_size {
        Ok(imageops::resize(&square, pixel_size, pixel_size, scale.filter()))
    } else {
        Ok(square)
    }
}

/// Read, decode and prepare a tile for placement in the mosaic
///
/// # Errors
///
/// Returns an error if the file cannot be read, decoded or is too small
pub fn load_tile(path: &Path, pixel_size: u32, scale: ScaleAlgorithm) -> Result<RgbaImage> {
    let image = load_image(path)?;
    prepare_tile(&image, pixel_size, scale, path)
}

/// Arithmetic mean of the R, G and B channels, truncated to 8 bits
///
/// Alpha is ignored. An empty image averages to black.
pub fn average_color(image: &RgbaImage) -> Rgb {
    let mut sums = [0_u64; 3];
    let mut count = 0_u64;

    for pixel in image.pixels() {
        let [r, g, b, _] = pixel.0;
        sums[0] += u64::from(r);
        sums[1] += u64::from(g);
        sums[2] += u64::from(b);
        count += 1;
    }

    if count == 0 {
        return Rgb::default();
    }

    let [r, g, b] = sums.map(|sum| (sum / count) as u8);
    Rgb::new(r, g, b)
}

/// Determine the output encoding from a target path's extension
pub fn output_format_for(path: &Path) -> Option<OutputFormat> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some(OutputFormat::Png),
        "jpg" => Some(OutputFormat::Jpeg),
        _ => None,
    }
}

/// Encode the finished canvas to `path`
///
/// JPEG output drops the alpha channel, so unrendered cells become black.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the encoder fails
pub fn write_output(canvas: RgbaImage, path: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(path).with_file_operation(path, "create output")?;
    let mut writer = BufWriter::new(file);

    let encoded = match format {
        OutputFormat::Png => canvas.write_to(&mut writer, ImageFormat::Png),
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            DynamicImage::ImageRgba8(canvas)
                .to_rgb8()
                .write_with_encoder(encoder)
        }
    };
    encoded.map_err(|source| MosaicError::ImageExport {
        path: path.to_path_buf(),
        source,
    })?;

    writer.flush().with_file_operation(path, "flush output")
}
