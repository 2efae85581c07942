//! Fixed-size worker pool draining bounded per-worker queues
//!
//! Each worker owns a queue of small capacity. Jobs are routed by key, and a
//! submission that cannot be queued within its timeout hands the payload back
//! so the caller can retry. That retry loop is the only backpressure: nothing
//! buffers beyond the queue capacities.
//!
//! A panicking job is caught and counted. Its worker keeps draining the queue,
//! so jobs routed behind it still run and callers waiting on completion
//! counters never stall.

use crate::io::configuration::SUBMIT_TIMEOUT;
use crate::io::error::{Result, worker_pool_error};
use crossbeam_channel::{SendTimeoutError, Sender, bounded};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, trace};

struct Job<T> {
    key: u64,
    payload: T,
}

/// Reason a submission was not accepted, carrying the payload back
pub enum SubmitError<T> {
    /// The target queue stayed full for the whole timeout
    Full(T),
    /// The target worker is no longer running
    Closed(T),
}

impl<T> SubmitError<T> {
    /// Recover the rejected payload
    pub fn into_payload(self) -> T {
        match self {
            Self::Full(payload) | Self::Closed(payload) => payload,
        }
    }
}

impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Bounded multi-threaded executor for side-effecting jobs
pub struct WorkerPool<T> {
    name: String,
    queues: Vec<Sender<Job<T>>>,
    workers: Vec<JoinHandle<()>>,
    panics: Arc<AtomicUsize>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `workers` threads, each with a queue of `capacity` jobs
    ///
    /// Both counts are raised to at least one.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned
    pub fn new<F>(name: &str, workers: usize, capacity: usize, handler: F) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let worker_count = workers.max(1);
        let capacity = capacity.max(1);
        let handler = Arc::new(handler);
        let panics = Arc::new(AtomicUsize::new(0));

        let mut queues = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let (sender, receiver) = bounded::<Job<T>>(capacity);
            let handler = Arc::clone(&handler);
            let worker_panics = Arc::clone(&panics);
            let worker_name = format!("{name}-{index}");

            let handle = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || {
                    for Job { key, payload } in receiver {
                        trace!(key, worker = index, "job started");
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(payload)));
                        if let Err(cause) = outcome {
                            worker_panics.fetch_add(1, Ordering::Relaxed);
                            error!(
                                worker = %worker_name,
                                key,
                                "job panicked: {}",
                                panic_message(cause.as_ref())
                            );
                        }
                    }
                })
                .map_err(|e| worker_pool_error(&format!("failed to spawn {name}-{index}: {e}")))?;

            queues.push(sender);
            handles.push(handle);
        }

        Ok(Self {
            name: name.to_string(),
            queues,
            workers: handles,
            panics,
        })
    }

    /// Number of worker threads
    pub const fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Try to queue a job for the worker selected by `key`
    ///
    /// # Errors
    ///
    /// Returns the payload inside [`SubmitError::Full`] if the queue stayed
    /// full for `timeout`, or [`SubmitError::Closed`] if the worker has exited
    pub fn submit(
        &self,
        key: u64,
        payload: T,
        timeout: Duration,
    ) -> std::result::Result<(), SubmitError<T>> {
        let Some(queue) = self.queue_for(key) else {
            return Err(SubmitError::Closed(payload));
        };

        match queue.send_timeout(Job { key, payload }, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(job)) => Err(SubmitError::Full(job.payload)),
            Err(SendTimeoutError::Disconnected(job)) => Err(SubmitError::Closed(job.payload)),
        }
    }

    /// Queue a job, retrying with [`SUBMIT_TIMEOUT`] until a slot frees up
    ///
    /// # Errors
    ///
    /// Returns an error if the target worker has exited
    pub fn submit_blocking(&self, key: u64, payload: T) -> Result<()> {
        let mut payload = payload;
        loop {
            match self.submit(key, payload, SUBMIT_TIMEOUT) {
                Ok(()) => return Ok(()),
                Err(SubmitError::Full(rejected)) => payload = rejected,
                Err(SubmitError::Closed(_)) => {
                    return Err(worker_pool_error(&format!(
                        "{} worker for key {key} has exited",
                        self.name
                    )));
                }
            }
        }
    }

    /// Number of jobs that panicked so far
    pub fn panicked_jobs(&self) -> usize {
        self.panics.load(Ordering::Relaxed)
    }

    /// Close the queues, let queued work drain and join every worker
    ///
    /// Only call once the caller's own completion tracking shows that no more
    /// work will be submitted.
    ///
    /// # Errors
    ///
    /// Returns an error if any job or worker panicked
    pub fn stop(mut self) -> Result<()> {
        self.queues.clear();

        let lost_workers = self
            .workers
            .drain(..)
            .map(JoinHandle::join)
            .filter(std::result::Result::is_err)
            .count();
        let panicked_jobs = self.panicked_jobs();

        if lost_workers == 0 && panicked_jobs == 0 {
            Ok(())
        } else {
            Err(worker_pool_error(&format!(
                "{panicked_jobs} {} job(s) panicked, {lost_workers} worker(s) lost",
                self.name
            )))
        }
    }

    fn queue_for(&self, key: u64) -> Option<&Sender<Job<T>>> {
        let index = key.checked_rem(self.queues.len() as u64)?;
        self.queues.get(index as usize)
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Submission and completion counters shared between a producer and its workers
#[derive(Debug, Default)]
pub struct InFlight {
    submitted: AtomicUsize,
    completed: AtomicUsize,
}

impl InFlight {
    /// Create counters with nothing submitted
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a job about to be submitted
    pub fn record_submission(&self) {
        self.submitted.fetch_add(1, Ordering::AcqRel);
    }

    /// Guard that counts the current job as completed when dropped
    ///
    /// Taken at the top of a job handler so completion is recorded on every
    /// exit path, including unwinding.
    pub const fn track(&self) -> CompletionGuard<'_> {
        CompletionGuard { counters: self }
    }

    /// Jobs submitted so far
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Acquire)
    }

    /// Jobs finished so far
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Jobs submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.submitted().saturating_sub(self.completed())
    }

    /// Whether every submitted job has finished
    pub fn is_idle(&self) -> bool {
        self.completed() >= self.submitted()
    }
}

/// Marks one job complete on drop; see [`InFlight::track`]
pub struct CompletionGuard<'a> {
    counters: &'a InFlight,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.counters.completed.fetch_add(1, Ordering::AcqRel);
    }
}
