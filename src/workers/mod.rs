//! Concurrency building blocks shared by every pipeline phase

/// Bounded worker pool and completion counters
pub mod pool;
/// Write-once job slots
pub mod slot;
/// In-order background persistence of completed slots
pub mod writer;
