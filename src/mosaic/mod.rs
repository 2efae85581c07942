//! Mosaic construction from a source image and an indexed library

/// Canvas planning, cell rendering and composition
pub mod compositor;
/// Nearest-color matching and the candidate cache
pub mod matcher;
/// Source image loading and color pre-analysis
pub mod source;
