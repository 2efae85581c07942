//! Load-time validation and repair of the tile metadata store
//!
//! Every record is checked against the filesystem in parallel. Records that no
//! longer decode, point at a missing file or (optionally) no longer match their
//! file's hash are collected and deleted together once the scan finishes.
//! Files that exist but cannot be read are left alone: a transient I/O failure
//! is not evidence that the record is stale.

use crate::io::configuration::{POLL_INTERVAL, QUEUE_CAPACITY};
use crate::io::error::Result;
use crate::io::progress::PhaseProgress;
use crate::store::database::TileStore;
use crate::store::record::{ContentHash, TileRecord};
use crate::workers::pool::{InFlight, WorkerPool};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, info, warn};

/// Settings for a validation pass
#[derive(Clone, Copy, Debug)]
pub struct ValidationOptions {
    /// Worker threads
    pub workers: usize,
    /// Re-read and re-hash every tile file
    pub check_hash: bool,
    /// Show a progress bar
    pub show_progress: bool,
}

/// Outcome of checking one stored record against the filesystem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordStatus {
    /// File exists and, if checked, hashes to the stored digest
    Valid,
    /// File exists but could not be inspected; the record is kept
    Unreadable,
    /// The stored value does not decode
    Undecodable,
    /// The file no longer exists
    Missing,
    /// The file's content hash differs from the stored digest
    Changed,
}

impl RecordStatus {
    /// Whether the record must be removed from the store
    pub const fn is_stale(self) -> bool {
        matches!(self, Self::Undecodable | Self::Missing | Self::Changed)
    }
}

/// Counts from a validation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Records examined
    pub total: usize,
    /// Records confirmed valid
    pub valid: usize,
    /// Records kept because their file could not be inspected
    pub unreadable: usize,
    /// Records removed because they did not decode
    pub undecodable: usize,
    /// Records removed because their file is gone
    pub missing: usize,
    /// Records removed because their file changed
    pub changed: usize,
    /// Records actually deleted from the store
    pub removed: usize,
}

impl ValidationReport {
    /// Records left in the store
    pub const fn kept(&self) -> usize {
        self.valid + self.unreadable
    }

    const fn record(&mut self, status: RecordStatus) {
        self.total += 1;
        match status {
            RecordStatus::Valid => self.valid += 1,
            RecordStatus::Unreadable => self.unreadable += 1,
            RecordStatus::Undecodable => self.undecodable += 1,
            RecordStatus::Missing => self.missing += 1,
            RecordStatus::Changed => self.changed += 1,
        }
    }
}

/// Check one raw stored entry against the filesystem
///
/// Returns the status and the number of file bytes accounted for progress.
pub fn check_record(key: &str, value: &[u8], check_hash: bool) -> (RecordStatus, u64) {
    let record = match TileRecord::decode(key, value) {
        Ok(record) => record,
        Err(e) => {
            warn!("record does not decode, deleting: {e}");
            return (RecordStatus::Undecodable, 0);
        }
    };

    let metadata = match std::fs::metadata(record.file_path()) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %record.path, "tile file is gone, deleting record");
            return (RecordStatus::Missing, 0);
        }
        Err(e) => {
            warn!(path = %record.path, "cannot stat tile, keeping record: {e}");
            return (RecordStatus::Unreadable, 0);
        }
    };
    let size = metadata.len();

    if !check_hash {
        return (RecordStatus::Valid, size);
    }

    let bytes = match std::fs::read(record.file_path()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %record.path, "cannot read tile, keeping record: {e}");
            return (RecordStatus::Unreadable, size);
        }
    };

    let hash = ContentHash::from_bytes(&bytes);
    if hash == record.hash {
        (RecordStatus::Valid, size)
    } else {
        warn!(
            path = %record.path,
            stored = %record.hash,
            actual = %hash,
            "tile content changed, deleting record"
        );
        (RecordStatus::Changed, size)
    }
}

#[derive(Default)]
struct Tally {
    report: ValidationReport,
    stale: Vec<String>,
}

#[derive(Default)]
struct ValidationState {
    jobs: InFlight,
    bytes: AtomicU64,
    tally: Mutex<Tally>,
}

/// Validate every record of the store's namespace and delete the stale ones
///
/// # Errors
///
/// Returns an error if the store cannot be read or written, or the worker
/// pool fails. Problems with individual records never fail the pass.
pub fn validate_store(store: &TileStore, options: &ValidationOptions) -> Result<ValidationReport> {
    let total = store.len()?;
    info!(
        namespace = store.namespace(),
        records = total,
        check_hash = options.check_hash,
        "validating tile store"
    );

    let state = Arc::new(ValidationState::default());
    let worker_state = Arc::clone(&state);
    let check_hash = options.check_hash;

    let handler = move |(key, value): (String, Vec<u8>)| {
        let _done = worker_state.jobs.track();
        let (status, bytes) = check_record(&key, &value, check_hash);
        worker_state.bytes.fetch_add(bytes, Ordering::Relaxed);

        let mut tally = worker_state.tally.lock();
        tally.report.record(status);
        if status.is_stale() {
            tally.stale.push(key);
        }
    };
    let pool = WorkerPool::new("validate", options.workers, QUEUE_CAPACITY, handler)?;

    let mut progress = PhaseProgress::new("validate", total, options.show_progress);
    let mut key_index = 0_u64;

    store.for_each_raw(|key, value| {
        state.jobs.record_submission();
        pool.submit_blocking(key_index, (key.to_string(), value.to_vec()))?;
        key_index += 1;
        report_progress(&mut progress, &state);
        Ok(())
    })?;

    while !state.jobs.is_idle() {
        report_progress(&mut progress, &state);
        thread::sleep(POLL_INTERVAL);
    }
    pool.stop()?;
    progress.finish();

    let Tally { mut report, stale } = std::mem::take(&mut *state.tally.lock());
    if !stale.is_empty() {
        report.removed = store.delete_batch(&stale)?;
    }
    debug!(
        elapsed_ms = progress.elapsed().as_millis(),
        "validation finished"
    );

    info!(
        total = report.total,
        kept = report.kept(),
        unreadable = report.unreadable,
        undecodable = report.undecodable,
        missing = report.missing,
        changed = report.changed,
        removed = report.removed,
        "tile store validated"
    );

    Ok(report)
}

fn report_progress(progress: &mut PhaseProgress, state: &ValidationState) {
    progress.update(
        state.jobs.completed() as u64,
        state.jobs.in_flight() as u64,
        state.bytes.load(Ordering::Relaxed),
        String::new,
    );
}
