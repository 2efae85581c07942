//! Tile library discovery and average-color indexing
//!
//! Files already present in the (validated) store are cache hits. Everything
//! else becomes a job slot; workers compute the slots in any order while the
//! async writer persists them in discovery order.

use crate::io::configuration::{POLL_INTERVAL, QUEUE_CAPACITY, TILE_EXTENSIONS};
use crate::io::error::{Result, WithPath, invalid_parameter};
use crate::io::image::{ScaleAlgorithm, average_color, decode_image, prepare_tile};
use crate::io::progress::PhaseProgress;
use crate::store::database::TileStore;
use crate::store::record::{ContentHash, TileRecord};
use crate::workers::pool::{InFlight, WorkerPool};
use crate::workers::slot::JobSlot;
use crate::workers::writer::AsyncWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Settings for an indexing pass
#[derive(Clone, Copy, Debug)]
pub struct IndexOptions {
    /// Worker threads
    pub workers: usize,
    /// Tile edge length the colors are computed at
    pub pixel_size: u32,
    /// Resampling algorithm for shrinking tiles
    pub scale: ScaleAlgorithm,
    /// Show a progress bar
    pub show_progress: bool,
}

/// Counts from an indexing pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Tile files found in the library
    pub discovered: usize,
    /// Files already present in the store
    pub cached: usize,
    /// Files whose color was computed in this pass
    pub computed: usize,
    /// Files skipped because they could not be processed
    pub failed: usize,
    /// Records persisted by the writer
    pub written: usize,
}

/// Whether a path has a recognized tile extension (case-insensitive)
pub fn is_tile_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TILE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Recursively list tile files under `library` as absolute paths
///
/// Unreadable entries and paths that are not valid UTF-8 are skipped with a
/// warning. The result is in walk order, which sorts siblings by name.
///
/// # Errors
///
/// Returns an error if `library` is not a directory
pub fn discover_tiles(library: &Path) -> Result<Vec<PathBuf>> {
    if !library.is_dir() {
        return Err(invalid_parameter(
            "lib",
            &library.display(),
            &"tile library must be a directory",
        ));
    }

    let mut tiles = Vec::new();
    for entry in WalkDir::new(library).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable library entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_tile_file(entry.path()) {
            continue;
        }

        let absolute = match std::path::absolute(entry.path()) {
            Ok(path) => path,
            Err(e) => {
                warn!(path = %entry.path().display(), "cannot make path absolute: {e}");
                continue;
            }
        };
        if absolute.to_str().is_none() {
            warn!(path = %absolute.display(), "skipping tile with non UTF-8 path");
            continue;
        }
        tiles.push(absolute);
    }

    Ok(tiles)
}

/// Compute the record for one tile file
///
/// Returns the record and the file size in bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded, or is smaller than
/// `pixel_size` after cropping
pub fn compute_tile_record(
    path: &Path,
    pixel_size: u32,
    scale: ScaleAlgorithm,
) -> Result<(TileRecord, u64)> {
    let bytes = std::fs::read(path).with_file_operation(path, "read tile")?;
    let image = decode_image(&bytes, path)?;
    let tile = prepare_tile(&image, pixel_size, scale, path)?;

    let record = TileRecord {
        path: path.to_string_lossy().into_owned(),
        color: average_color(&tile),
        hash: ContentHash::from_bytes(&bytes),
    };
    Ok((record, bytes.len() as u64))
}

type TileSlot = JobSlot<PathBuf, TileRecord>;

#[derive(Default)]
struct IndexState {
    jobs: InFlight,
    bytes: AtomicU64,
    failed: AtomicUsize,
}

/// Bring the store up to date with the tile library
///
/// # Errors
///
/// Returns an error if the library cannot be listed, the store cannot be read
/// or written, or the worker pool fails. Individual tiles that cannot be
/// processed are skipped and counted in [`IndexReport::failed`].
pub fn index_library(
    store: &Arc<TileStore>,
    library: &Path,
    options: &IndexOptions,
) -> Result<IndexReport> {
    let files = discover_tiles(library)?;
    let known = store.keys()?;

    let mut report = IndexReport {
        discovered: files.len(),
        ..IndexReport::default()
    };

    let pending: Vec<TileSlot> = files
        .into_iter()
        .filter(|path| !known.contains(&*path.to_string_lossy()))
        .map(JobSlot::new)
        .collect();
    report.cached = report.discovered - pending.len();

    info!(
        library = %library.display(),
        discovered = report.discovered,
        cached = report.cached,
        pending = pending.len(),
        "tile library listed"
    );

    if pending.is_empty() {
        return Ok(report);
    }

    let slots: Arc<[TileSlot]> = pending.into();

    let writer_store = Arc::clone(store);
    let writer = AsyncWriter::spawn(Arc::clone(&slots), move |batch: &[TileRecord]| {
        writer_store.put_batch(batch)
    })?;

    let state = Arc::new(IndexState::default());
    let worker_state = Arc::clone(&state);
    let worker_slots = Arc::clone(&slots);
    let IndexOptions { pixel_size, scale, .. } = *options;

    let handler = move |index: usize| {
        let _done = worker_state.jobs.track();
        let Some(slot) = worker_slots.get(index) else {
            return;
        };
        let guard = slot.claim();

        match compute_tile_record(guard.input(), pixel_size, scale) {
            Ok((record, size)) => {
                worker_state.bytes.fetch_add(size, Ordering::Relaxed);
                guard.succeed(record);
            }
            Err(e) => {
                worker_state.failed.fetch_add(1, Ordering::Relaxed);
                warn!("skipping tile: {e}");
            }
        }
    };
    let pool = WorkerPool::new("index", options.workers, QUEUE_CAPACITY, handler)?;

    let mut progress = PhaseProgress::new("index", slots.len() as u64, options.show_progress);

    for index in 0..slots.len() {
        state.jobs.record_submission();
        if let Err(e) = pool.submit_blocking(index as u64, index) {
            abandon(slots.get(index..).unwrap_or_default());
            return Err(e);
        }
        report_progress(&mut progress, &state, &writer);
    }

    while !state.jobs.is_idle() {
        report_progress(&mut progress, &state, &writer);
        thread::sleep(POLL_INTERVAL);
    }
    pool.stop()?;

    // a finished job is not yet a persisted record
    while !writer.is_finished() {
        report_progress(&mut progress, &state, &writer);
        thread::sleep(POLL_INTERVAL);
    }
    report.written = writer.join()?;
    progress.finish();

    report.failed = state.failed.load(Ordering::Relaxed);
    report.computed = slots.iter().filter(|slot| slot.succeeded()).count();

    info!(
        computed = report.computed,
        failed = report.failed,
        written = report.written,
        "tile library indexed"
    );

    Ok(report)
}

// Lets the writer run to the end when submission stops early
fn abandon(slots: &[TileSlot]) {
    for slot in slots {
        slot.complete(None);
    }
}

fn report_progress(progress: &mut PhaseProgress, state: &IndexState, writer: &AsyncWriter) {
    progress.update(
        state.jobs.completed() as u64,
        state.jobs.in_flight() as u64,
        state.bytes.load(Ordering::Relaxed),
        || format!("saved={}", writer.frontier()),
    );
}
