//! Tile library indexing and diagnostics

/// Color distribution report for the indexed library
pub mod distribution;
/// Discovery and average-color indexing of tile files
pub mod indexer;
