//! Photo-mosaic generation from a library of tile images
//!
//! Every pixel of a downscaled source image is replaced by the library tile
//! whose average color is nearest to it. Tile colors are computed once and
//! kept in a persistent store, validated against the filesystem on each run.

#![forbid(unsafe_code)]

/// Input/output operations, configuration and error handling
pub mod io;
/// Tile library indexing and color distribution diagnostics
pub mod library;
/// Color representation and distance
pub mod math;
/// Source analysis, tile matching and canvas composition
pub mod mosaic;
/// Persistent tile metadata store
pub mod store;
/// Worker pool, job slots and the async writer
pub mod workers;

pub use io::error::{MosaicError, Result};
