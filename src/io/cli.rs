//! Command-line interface and end-to-end mosaic pipeline

use crate::io::configuration::{
    BYTES_PER_GB, DEFAULT_DATABASE, DEFAULT_LIBRARY_NAME, DEFAULT_MAX_SIZE_GB,
    DEFAULT_PIXEL_SIZE, DEFAULT_SOURCE_SIZE, DEFAULT_WORKERS, FREQUENT_COLOR_THRESHOLD,
    MosaicConfig,
};
use crate::io::error::{MosaicError, Result, invalid_parameter};
use crate::io::image::{ScaleAlgorithm, output_format_for, write_output};
use crate::library::distribution::DistributionReport;
use crate::library::indexer::{IndexOptions, IndexReport, index_library};
use crate::mosaic::compositor::{
    CanvasPlan, GenerationOptions, GenerationReport, MosaicGrid, generate_mosaic,
};
use crate::mosaic::matcher::{MatchCache, MatchEngine};
use crate::mosaic::source::SourceImage;
use crate::store::database::{Namespace, TileStore};
use crate::store::validation::{ValidationOptions, ValidationReport, validate_store};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tilemosaic")]
#[command(
    author,
    version,
    about = "Rebuild an image as a mosaic of tiles from an image library"
)]
/// Command-line arguments for the mosaic generator
pub struct Cli {
    /// Source image to rebuild
    #[arg(long = "src", value_name = "FILE")]
    pub source: PathBuf,

    /// Output image, `.png` or `.jpg`
    #[arg(long, value_name = "FILE")]
    pub target: PathBuf,

    /// Directory searched recursively for tile images
    #[arg(long = "lib", value_name = "DIR")]
    pub library: PathBuf,

    /// Worker threads per phase
    #[arg(long = "worker", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Tile metadata store file
    #[arg(long, default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Tile edge length in output pixels
    #[arg(long = "pixelsize", default_value_t = DEFAULT_PIXEL_SIZE)]
    pub pixel_size: u32,

    /// Resampling algorithm for every resize
    #[arg(
        long = "scalealg",
        value_enum,
        default_value_t = ScaleAlgorithm::default()
    )]
    pub scale: ScaleAlgorithm,

    /// Re-hash tile files when loading the store
    #[arg(long = "checkhash", default_value_t = true, action = ArgAction::Set)]
    pub check_hash: bool,

    /// Output size cap in gigabytes of uncompressed RGBA
    #[arg(long = "maxsize", default_value_t = DEFAULT_MAX_SIZE_GB)]
    pub max_size: u64,

    /// Store namespace for this tile library
    #[arg(long = "libname", default_value = DEFAULT_LIBRARY_NAME)]
    pub library_name: String,

    /// Bound for the longer side of the downscaled source
    #[arg(long = "srcsize", default_value_t = DEFAULT_SOURCE_SIZE)]
    pub source_size: u32,

    /// Seed for tie-break and flip randomness, random if omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Hide progress bars
    #[arg(short, long)]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Check if progress should be displayed
    pub const fn should_show_progress(&self) -> bool {
        !self.quiet
    }

    /// Validate the arguments into a run configuration
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::InvalidParameter`] if the target extension is
    /// not `.png` or `.jpg`, a numeric option is zero, the namespace is empty,
    /// or the source or library path does not exist
    pub fn into_config(self) -> Result<MosaicConfig> {
        let output_format = output_format_for(&self.target).ok_or_else(|| {
            invalid_parameter(
                "target",
                &self.target.display(),
                &"output must end in .png or .jpg",
            )
        })?;

        require_positive("worker", self.workers as u64)?;
        require_positive("pixelsize", u64::from(self.pixel_size))?;
        require_positive("srcsize", u64::from(self.source_size))?;
        require_positive("maxsize", self.max_size)?;

        if self.library_name.is_empty() {
            return Err(invalid_parameter(
                "libname",
                &self.library_name,
                &"namespace must not be empty",
            ));
        }
        if !self.source.is_file() {
            return Err(invalid_parameter(
                "src",
                &self.source.display(),
                &"source image does not exist",
            ));
        }
        if !self.library.is_dir() {
            return Err(invalid_parameter(
                "lib",
                &self.library.display(),
                &"tile library must be a directory",
            ));
        }

        let show_progress = self.should_show_progress();
        Ok(MosaicConfig {
            source: self.source,
            target: self.target,
            output_format,
            library: self.library,
            workers: self.workers,
            database: self.database,
            pixel_size: self.pixel_size,
            scale: self.scale,
            check_hash: self.check_hash,
            max_output_bytes: self.max_size.saturating_mul(BYTES_PER_GB),
            library_name: self.library_name,
            source_size: self.source_size,
            seed: self.seed.unwrap_or_else(rand::random),
            show_progress,
        })
    }
}

fn require_positive(parameter: &'static str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(invalid_parameter(parameter, &value, &"must be at least 1"));
    }
    Ok(())
}

/// Reports from every phase of a run
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Store validation counts
    pub validation: ValidationReport,
    /// Library indexing counts
    pub index: IndexReport,
    /// Library color distribution
    pub distribution: DistributionReport,
    /// Cell rendering counts
    pub generation: GenerationReport,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
}

/// Runs the full pipeline: source analysis, store upkeep, indexing,
/// matching and composition
pub struct MosaicRunner {
    config: MosaicConfig,
}

impl MosaicRunner {
    /// Create a runner for a validated configuration
    pub const fn new(config: MosaicConfig) -> Self {
        Self { config }
    }

    /// Produce the mosaic and write it to the target path
    ///
    /// The output size is checked right after the source is analysed, before
    /// any tile is decoded. Nothing is written to the target unless every
    /// phase succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded, the output would
    /// exceed the size cap, the store cannot be opened or updated, the
    /// namespace has no tiles, a fatal matching error occurs, or the output
    /// cannot be written
    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let started = Instant::now();
        info!(seed = config.seed, "starting mosaic run");

        let source = SourceImage::load(&config.source, config.source_size, config.scale)?;
        let plan = CanvasPlan::for_source(&source, config.pixel_size);
        plan.check_budget(config.max_output_bytes)?;
        info!(
            columns = plan.columns(),
            rows = plan.rows(),
            width = plan.width(),
            height = plan.height(),
            bytes = plan.estimated_bytes(),
            "canvas planned"
        );

        let cache = Arc::new(MatchCache::new());
        let frequent = source.frequent_colors(FREQUENT_COLOR_THRESHOLD);
        for &(color, count) in &frequent {
            cache.seed(color, count);
        }
        info!(
            colors = cache.len(),
            threshold = FREQUENT_COLOR_THRESHOLD,
            top_frequency = frequent.first().map_or(0, |&(_, count)| count),
            "match cache seeded with frequent source colors"
        );

        let namespace = Namespace::new(config.library_name.clone(), config.pixel_size);
        let store = Arc::new(TileStore::open(&config.database, &namespace)?);

        let validation = validate_store(
            &store,
            &ValidationOptions {
                workers: config.workers,
                check_hash: config.check_hash,
                show_progress: config.show_progress,
            },
        )?;

        let index = index_library(
            &store,
            &config.library,
            &IndexOptions {
                workers: config.workers,
                pixel_size: config.pixel_size,
                scale: config.scale,
                show_progress: config.show_progress,
            },
        )?;

        let distribution = DistributionReport::from_records(&store.records()?);
        if distribution.total == 0 {
            return Err(MosaicError::EmptyLibrary {
                namespace: store.namespace().to_string(),
            });
        }
        distribution.log();

        let engine = Arc::new(MatchEngine::new(
            Arc::clone(&store),
            cache,
            config.pixel_size,
            config.scale,
        ));
        let grid = Arc::new(MosaicGrid::new(plan));
        let generation = generate_mosaic(
            &source,
            &engine,
            &grid,
            &GenerationOptions {
                workers: config.workers,
                seed: config.seed,
                show_progress: config.show_progress,
            },
        )?;

        let canvas = grid.compose()?;
        let (width, height) = canvas.dimensions();
        write_output(canvas, &config.target, config.output_format)?;

        info!(
            target = %config.target.display(),
            width,
            height,
            elapsed_ms = started.elapsed().as_millis(),
            "mosaic written"
        );

        Ok(RunSummary {
            validation,
            index,
            distribution,
            generation,
            width,
            height,
        })
    }
}
