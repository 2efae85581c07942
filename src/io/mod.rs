//! Command line, configuration, errors, image I/O, logging and progress

/// Command-line parsing and the end-to-end pipeline
pub mod cli;
/// Runtime constants and the validated run configuration
pub mod configuration;
/// Error types and path context
pub mod error;
/// Image decoding, tile preparation and output encoding
pub mod image;
/// Tracing subscriber setup
pub mod logging;
/// Progress bars and throughput reporting
pub mod progress;
