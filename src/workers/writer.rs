//! Ordered persistence of completed job slots on a dedicated thread

use crate::io::configuration::{POLL_INTERVAL, WRITE_BATCH_SIZE};
use crate::io::error::{Result, worker_pool_error};
use crate::workers::slot::JobSlot;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Sequential consumer that persists slot results in slot order
///
/// The writer keeps a single cursor into the slot list and only moves it
/// forward, waiting on the slot under the cursor until it is done. Total work
/// over a run is linear in the number of slots. Successful results are handed
/// to the persist callback in batches of up to [`WRITE_BATCH_SIZE`]; a batch is
/// flushed early whenever the writer would otherwise wait.
pub struct AsyncWriter {
    handle: JoinHandle<Result<usize>>,
    frontier: Arc<AtomicUsize>,
}

impl AsyncWriter {
    /// Start the writer thread over `slots`
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn<I, R, F>(slots: Arc<[JobSlot<I, R>]>, persist: F) -> Result<Self>
    where
        I: Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
        F: FnMut(&[R]) -> Result<()> + Send + 'static,
    {
        let frontier = Arc::new(AtomicUsize::new(0));
        let thread_frontier = Arc::clone(&frontier);

        let handle = thread::Builder::new()
            .name("store-writer".to_string())
            .spawn(move || drain_in_order(&slots, persist, &thread_frontier))
            .map_err(|e| worker_pool_error(&format!("failed to spawn store writer: {e}")))?;

        Ok(Self { handle, frontier })
    }

    /// Number of leading slots whose results have been persisted or skipped
    pub fn frontier(&self) -> usize {
        self.frontier.load(Ordering::Acquire)
    }

    /// Whether the writer has reached the end of the slot list
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the writer to reach the end of the slots
    ///
    /// # Errors
    ///
    /// Returns the first persistence error, or an error if the thread panicked
    pub fn join(self) -> Result<usize> {
        self.handle
            .join()
            .map_err(|panic| worker_pool_error(&format!("store writer panicked: {panic:?}")))?
    }
}

fn drain_in_order<I, R, F>(
    slots: &[JobSlot<I, R>],
    mut persist: F,
    frontier: &AtomicUsize,
) -> Result<usize>
where
    R: Clone,
    F: FnMut(&[R]) -> Result<()>,
{
    let mut cursor = 0;
    let mut written = 0;
    let mut batch: Vec<R> = Vec::with_capacity(WRITE_BATCH_SIZE);

    while let Some(slot) = slots.get(cursor) {
        if slot.is_done() {
            if let Some(result) = slot.result() {
                batch.push(result.clone());
            }
            cursor += 1;
            if batch.len() < WRITE_BATCH_SIZE {
                if batch.is_empty() {
                    frontier.store(cursor, Ordering::Release);
                }
                continue;
            }
        } else if batch.is_empty() {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        written += flush(&mut persist, &mut batch)?;
        frontier.store(cursor, Ordering::Release);
    }

    written += flush(&mut persist, &mut batch)?;
    frontier.store(cursor, Ordering::Release);
    debug!(slots = cursor, written, "store writer finished");
    Ok(written)
}

fn flush<R, F>(persist: &mut F, batch: &mut Vec<R>) -> Result<usize>
where
    F: FnMut(&[R]) -> Result<()>,
{
    if batch.is_empty() {
        return Ok(0);
    }
    persist(batch.as_slice())?;
    let count = batch.len();
    batch.clear();
    Ok(count)
}
