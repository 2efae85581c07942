//! Color arithmetic

/// 24-bit RGB colors, distances and the reference palette
pub mod color;
