//! Runtime constants, defaults and the validated run configuration

use crate::io::image::ScaleAlgorithm;
use std::path::PathBuf;
use std::time::Duration;

// Worker pool and pipeline tuning
/// Default number of worker threads per phase
pub const DEFAULT_WORKERS: usize = 12;
/// Capacity of each worker's job queue
pub const QUEUE_CAPACITY: usize = 16;
/// Timeout for a single job submission attempt before retrying
pub const SUBMIT_TIMEOUT: Duration = Duration::from_millis(10);
/// Sleep between completion checks while waiting on workers or slots
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Maximum records persisted per store transaction by the async writer
pub const WRITE_BATCH_SIZE: usize = 64;

// Progress reporting
/// Minimum interval between throughput reports
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

// Matching
/// Source colors seen at least this often get a match cache entry up front
pub const FREQUENT_COLOR_THRESHOLD: u32 = 16;

// Default values for configurable parameters
/// Default metadata store file
pub const DEFAULT_DATABASE: &str = "./database.bin";
/// Default tile edge length in output pixels
pub const DEFAULT_PIXEL_SIZE: u32 = 64;
/// Default output size cap in gigabytes
pub const DEFAULT_MAX_SIZE_GB: u64 = 4;
/// Default namespace for the tile library
pub const DEFAULT_LIBRARY_NAME: &str = "default";
/// Default bound for the longer side of the downscaled source
pub const DEFAULT_SOURCE_SIZE: u32 = 128;

// Output settings
/// JPEG encoder quality for `.jpg` targets
pub const JPEG_QUALITY: u8 = 100;
/// File extensions recognized as tiles (lowercase)
pub const TILE_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "gif"];

/// Bytes per gigabyte for the output size cap
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Encoded format of the output mosaic, chosen by the target extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossless PNG with alpha
    Png,
    /// JPEG at [`JPEG_QUALITY`]
    Jpeg,
}

/// Validated settings for a full mosaic run
#[derive(Clone, Debug)]
pub struct MosaicConfig {
    /// Source image path
    pub source: PathBuf,
    /// Output image path
    pub target: PathBuf,
    /// Output encoding
    pub output_format: OutputFormat,
    /// Tile library directory
    pub library: PathBuf,
    /// Worker threads per phase
    pub workers: usize,
    /// Metadata store file
    pub database: PathBuf,
    /// Tile edge length in output pixels
    pub pixel_size: u32,
    /// Resampling algorithm for all resizes
    pub scale: ScaleAlgorithm,
    /// Re-hash tile files when loading the store
    pub check_hash: bool,
    /// Output size cap in bytes
    pub max_output_bytes: u64,
    /// Namespace for the tile library in the store
    pub library_name: String,
    /// Bound for the longer side of the downscaled source
    pub source_size: u32,
    /// Seed for tie-break and flip randomness
    pub seed: u64,
    /// Show progress bars
    pub show_progress: bool,
}
