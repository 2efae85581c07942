//! Per-phase progress bars and periodic throughput logging

use crate::io::configuration::REPORT_INTERVAL;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const BYTES_PER_MB: u64 = 1024 * 1024;

static PHASE_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{prefix:>10} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
});

/// Rates derived from a progress sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Throughput {
    /// Completed items per second
    pub per_second: f64,
    /// Completed share of the total, 0 to 100
    pub percent: u64,
    /// Estimated time until completion, unknown until work has been done
    pub eta: Option<Duration>,
    /// Data processed so far in megabytes
    pub megabytes: u64,
    /// Data rate in megabytes per second
    pub megabytes_per_second: u64,
}

impl Throughput {
    /// Derive rates from completed work and elapsed time
    pub fn sample(done: u64, total: u64, bytes: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        let per_second = if seconds > 0.0 {
            done as f64 / seconds
        } else {
            0.0
        };

        let percent = if total == 0 {
            100
        } else {
            done.min(total) * 100 / total
        };

        let eta = (per_second > 0.0)
            .then(|| Duration::from_secs_f64(total.saturating_sub(done) as f64 / per_second));

        let megabytes = bytes / BYTES_PER_MB;
        let megabytes_per_second = if seconds >= 1.0 {
            (megabytes as f64 / seconds) as u64
        } else {
            megabytes
        };

        Self {
            per_second,
            percent,
            eta,
            megabytes,
            megabytes_per_second,
        }
    }
}

/// Progress display for one pipeline phase
///
/// The bar is updated on every call; a throughput line is logged at most
/// once per [`REPORT_INTERVAL`].
pub struct PhaseProgress {
    label: &'static str,
    total: u64,
    bar: ProgressBar,
    started: Instant,
    last_report: Instant,
}

impl PhaseProgress {
    /// Start tracking a phase of `total` items
    pub fn new(label: &'static str, total: u64, visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(total);
            bar.set_style(PHASE_STYLE.clone());
            bar.set_prefix(label);
            bar
        } else {
            ProgressBar::hidden()
        };

        let now = Instant::now();
        Self {
            label,
            total,
            bar,
            started: now,
            last_report: now,
        }
    }

    /// Total items in this phase
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Record progress, logging throughput if the report interval has passed
    ///
    /// `detail` is only evaluated when a report is logged.
    pub fn update<F>(&mut self, done: u64, in_flight: u64, bytes: u64, detail: F)
    where
        F: FnOnce() -> String,
    {
        self.bar.set_position(done);

        let now = Instant::now();
        if now.duration_since(self.last_report) < REPORT_INTERVAL {
            return;
        }
        self.last_report = now;

        let rates = Throughput::sample(done, self.total, bytes, now - self.started);
        let eta = rates
            .eta
            .map_or_else(String::new, |eta| format!("{}s", eta.as_secs()));
        let detail = detail();
        self.bar.set_message(detail.clone());

        info!(
            "{} speed={:.2}/s percent={}% eta={} in_flight={} progress={}/{} data={}M dataspeed={}M/s {}",
            self.label,
            rates.per_second,
            rates.percent,
            eta,
            in_flight,
            done,
            self.total,
            rates.megabytes,
            rates.megabytes_per_second,
            detail,
        );
    }

    /// Time since the phase started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Clear the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        debug!(
            phase = self.label,
            total = self.total(),
            elapsed_ms = self.elapsed().as_millis(),
            "phase finished"
        );
    }
}
