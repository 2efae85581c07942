//! Canvas planning, parallel cell rendering and final composition
//!
//! Every source pixel becomes one cell job. Workers resolve the cell's color
//! to candidates, pick one with the cell's own random stream and record the
//! placement. Each cell is written exactly once, so the grid needs no lock;
//! the pixels are laid out in a single pass once all cells are placed.

use crate::io::configuration::{POLL_INTERVAL, QUEUE_CAPACITY};
use crate::io::error::{MosaicError, Result};
use crate::io::progress::PhaseProgress;
use crate::math::color::Rgb;
use crate::mosaic::matcher::{MatchEngine, cell_rng, choose_variant};
use crate::mosaic::source::SourceImage;
use crate::workers::pool::{InFlight, WorkerPool};
use image::{RgbaImage, imageops};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{error, info, warn};

const BYTES_PER_PIXEL: u64 = 4;

/// Output geometry derived from the source cells and tile size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasPlan {
    columns: u32,
    rows: u32,
    pixel_size: u32,
}

impl CanvasPlan {
    /// Plan a canvas of `columns` x `rows` cells of `pixel_size` pixels each
    pub const fn new(columns: u32, rows: u32, pixel_size: u32) -> Self {
        Self {
            columns,
            rows,
            pixel_size,
        }
    }

    /// Plan the canvas for a downscaled source
    pub fn for_source(source: &SourceImage, pixel_size: u32) -> Self {
        Self::new(source.width(), source.height(), pixel_size)
    }

    /// Cells per row
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Cell rows
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Tile edge length
    pub const fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    /// Number of cells
    pub const fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Canvas width in pixels
    pub fn width(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.pixel_size)
    }

    /// Canvas height in pixels
    pub fn height(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.pixel_size)
    }

    /// Uncompressed RGBA size of the canvas, saturating on overflow
    pub fn estimated_bytes(&self) -> u64 {
        self.width()
            .saturating_mul(self.height())
            .saturating_mul(BYTES_PER_PIXEL)
    }

    /// Reject a canvas larger than `limit_bytes`
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::OutputTooLarge`] if the estimate exceeds the
    /// limit or a side does not fit an image dimension
    pub fn check_budget(&self, limit_bytes: u64) -> Result<()> {
        let required_bytes = self.estimated_bytes();
        let fits_dimensions =
            u32::try_from(self.width()).is_ok() && u32::try_from(self.height()).is_ok();
        if required_bytes > limit_bytes || !fits_dimensions {
            return Err(MosaicError::OutputTooLarge {
                required_bytes,
                limit_bytes,
            });
        }
        Ok(())
    }
}

/// The tile chosen for one cell
#[derive(Clone, Debug)]
pub struct Placement {
    /// Prepared tile image
    pub tile: Arc<RgbaImage>,
    /// Whether the tile is drawn mirrored horizontally
    pub flipped: bool,
}

/// Write-once placement for every cell of a canvas
pub struct MosaicGrid {
    plan: CanvasPlan,
    cells: Vec<OnceLock<Placement>>,
}

impl MosaicGrid {
    /// Create a grid with every cell empty
    pub fn new(plan: CanvasPlan) -> Self {
        let cells = std::iter::repeat_with(OnceLock::new)
            .take(plan.cell_count())
            .collect();
        Self { plan, cells }
    }

    /// The canvas plan
    pub const fn plan(&self) -> &CanvasPlan {
        &self.plan
    }

    /// Place a tile; returns `false` if the cell is outside the grid or taken
    pub fn place(&self, x: u32, y: u32, placement: Placement) -> bool {
        self.cell(x, y)
            .is_some_and(|cell| cell.set(placement).is_ok())
    }

    /// The placement of a cell, if any
    pub fn placement(&self, x: u32, y: u32) -> Option<&Placement> {
        self.cell(x, y).and_then(OnceLock::get)
    }

    /// Number of placed cells
    pub fn placed(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    fn cell(&self, x: u32, y: u32) -> Option<&OnceLock<Placement>> {
        if x >= self.plan.columns || y >= self.plan.rows {
            return None;
        }
        self.cells
            .get(y as usize * self.plan.columns as usize + x as usize)
    }

    /// Draw every placed tile onto a new canvas
    ///
    /// Cells without a placement stay transparent black.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::OutputTooLarge`] if the canvas does not fit
    /// image dimensions
    pub fn compose(&self) -> Result<RgbaImage> {
        let too_large = || MosaicError::OutputTooLarge {
            required_bytes: self.plan.estimated_bytes(),
            limit_bytes: u64::from(u32::MAX),
        };
        let width = u32::try_from(self.plan.width()).map_err(|_overflow| too_large())?;
        let height = u32::try_from(self.plan.height()).map_err(|_overflow| too_large())?;

        let mut canvas = RgbaImage::new(width, height);
        let size = i64::from(self.plan.pixel_size);
        for y in 0..self.plan.rows {
            for x in 0..self.plan.columns {
                let Some(placement) = self.placement(x, y) else {
                    continue;
                };
                let (left, top) = (i64::from(x) * size, i64::from(y) * size);
                if placement.flipped {
                    let mirrored = imageops::flip_horizontal(placement.tile.as_ref());
                    imageops::replace(&mut canvas, &mirrored, left, top);
                } else {
                    imageops::replace(&mut canvas, placement.tile.as_ref(), left, top);
                }
            }
        }
        Ok(canvas)
    }
}

/// Settings for the generation phase
#[derive(Clone, Copy, Debug)]
pub struct GenerationOptions {
    /// Worker threads
    pub workers: usize,
    /// Seed for tie-break and flip randomness
    pub seed: u64,
    /// Show a progress bar
    pub show_progress: bool,
}

/// Counts from the generation phase
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Cells in the canvas
    pub cells: usize,
    /// Cells that received a tile
    pub placed: usize,
    /// Cells left empty because their candidates could not be prepared
    pub failed: usize,
    /// Cells answered from an already populated cache entry
    pub cache_hits: u64,
}

#[derive(Clone, Copy)]
struct CellJob {
    x: u32,
    y: u32,
    color: Rgb,
}

#[derive(Default)]
struct GenerationState {
    jobs: InFlight,
    failed: AtomicUsize,
    cache_hits: AtomicU64,
    fatal: Mutex<Option<MosaicError>>,
}

/// Whether a cell failure must abort the whole run
///
/// Store-level failures affect every cell; a tile that cannot be prepared
/// only affects the cells that matched it.
pub const fn is_fatal(error: &MosaicError) -> bool {
    matches!(
        error,
        MosaicError::CorruptRecord { .. }
            | MosaicError::Store { .. }
            | MosaicError::NoCandidates { .. }
            | MosaicError::WorkerPool { .. }
    )
}

/// Render one cell; returns whether its candidates came from the cache
///
/// # Errors
///
/// Returns the resolution error for the cell's color
pub fn render_cell(
    engine: &MatchEngine,
    grid: &MosaicGrid,
    seed: u64,
    x: u32,
    y: u32,
    color: Rgb,
) -> Result<bool> {
    let resolution = engine.resolve(color)?;
    let mut rng = cell_rng(seed, x, y);
    let Some((index, flipped)) = choose_variant(resolution.candidates.len(), &mut rng) else {
        return Err(MosaicError::NoCandidates { color });
    };
    let Some(tile) = resolution.candidates.get(index) else {
        return Err(MosaicError::NoCandidates { color });
    };
    let placement = Placement {
        tile: Arc::clone(tile),
        flipped,
    };
    grid.place(x, y, placement);
    Ok(resolution.cached)
}

/// Place a tile in every cell of `grid`
///
/// # Errors
///
/// Returns the first fatal error (see [`is_fatal`]) or a worker pool
/// failure. Cells whose tiles cannot be prepared are left empty and counted
/// in [`GenerationReport::failed`].
pub fn generate_mosaic(
    source: &SourceImage,
    engine: &Arc<MatchEngine>,
    grid: &Arc<MosaicGrid>,
    options: &GenerationOptions,
) -> Result<GenerationReport> {
    let state = Arc::new(GenerationState::default());
    let worker_state = Arc::clone(&state);
    let worker_engine = Arc::clone(engine);
    let worker_grid = Arc::clone(grid);
    let seed = options.seed;

    let handler = move |job: CellJob| {
        let _done = worker_state.jobs.track();
        match render_cell(&worker_engine, &worker_grid, seed, job.x, job.y, job.color) {
            Ok(true) => {
                worker_state.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) if is_fatal(&e) => {
                error!(x = job.x, y = job.y, "cannot render cell: {e}");
                let mut fatal = worker_state.fatal.lock();
                if fatal.is_none() {
                    *fatal = Some(e);
                }
            }
            Err(e) => {
                worker_state.failed.fetch_add(1, Ordering::Relaxed);
                warn!(x = job.x, y = job.y, color = %job.color, "leaving cell empty: {e}");
            }
        }
    };
    let pool = WorkerPool::new("generate", options.workers, QUEUE_CAPACITY, handler)?;

    let cells = grid.plan().cell_count();
    let mut progress = PhaseProgress::new("generate", cells as u64, options.show_progress);

    for (key, (x, y, color)) in (0_u64..).zip(source.cells()) {
        if state.fatal.lock().is_some() {
            break;
        }
        state.jobs.record_submission();
        pool.submit_blocking(key, CellJob { x, y, color })?;
        report_progress(&mut progress, &state);
    }

    while !state.jobs.is_idle() {
        report_progress(&mut progress, &state);
        thread::sleep(POLL_INTERVAL);
    }
    pool.stop()?;
    progress.finish();

    if let Some(e) = state.fatal.lock().take() {
        return Err(e);
    }

    let report = GenerationReport {
        cells,
        placed: grid.placed(),
        failed: state.failed.load(Ordering::Relaxed),
        cache_hits: state.cache_hits.load(Ordering::Relaxed),
    };
    info!(
        cells = report.cells,
        placed = report.placed,
        failed = report.failed,
        cache_hits = report.cache_hits,
        scans = engine.cache().scans(),
        populated = engine.cache().populated(),
        "mosaic cells rendered"
    );
    engine.cache().log_entries();
    Ok(report)
}

fn report_progress(progress: &mut PhaseProgress, state: &GenerationState) {
    let done = state.jobs.completed() as u64;
    let hits = state.cache_hits.load(Ordering::Relaxed);
    progress.update(done, state.jobs.in_flight() as u64, 0, || {
        let percent = if done == 0 { 0 } else { hits * 100 / done };
        format!("cached={hits} cached_percent={percent}%")
    });
}
