//! RGB color triples, distance metrics and the reference palette used for diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of distinct 24-bit RGB colors
pub const COLOR_SPACE_SIZE: usize = 1 << 24;

/// An 8-bit-per-channel RGB color
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Rgb {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Rgb {
    /// Create a color from its channels
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pack the color into a dense 24-bit index (`r<<16 | g<<8 | b`)
    pub const fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Inverse of [`Rgb::packed`]; bits above 24 are ignored
    pub const fn from_packed(key: u32) -> Self {
        Self {
            r: (key >> 16) as u8,
            g: (key >> 8) as u8,
            b: key as u8,
        }
    }

    /// Squared Euclidean distance in RGB space
    ///
    /// Monotonic in the true distance, so it orders candidates identically
    /// while staying in exact integer arithmetic.
    pub const fn distance_squared(self, other: Self) -> u32 {
        let dr = self.r.abs_diff(other.r) as u32;
        let dg = self.g.abs_diff(other.g) as u32;
        let db = self.b.abs_diff(other.b) as u32;
        dr * dr + dg * dg + db * db
    }

    /// Euclidean distance in RGB space
    pub fn distance(self, other: Self) -> f64 {
        f64::from(self.distance_squared(other)).sqrt()
    }

    /// Take the color channels of an RGBA pixel, ignoring alpha
    pub const fn from_rgba(pixel: [u8; 4]) -> Self {
        Self {
            r: pixel[0],
            g: pixel[1],
            b: pixel[2],
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r {} g {} b {}", self.r, self.g, self.b)
    }
}

/// The sixteen HTML basic colors, used to bucket library colors for operators
pub const REFERENCE_PALETTE: [(&str, Rgb); 16] = [
    ("Black", Rgb::new(0, 0, 0)),
    ("White", Rgb::new(255, 255, 255)),
    ("Red", Rgb::new(255, 0, 0)),
    ("Lime", Rgb::new(0, 255, 0)),
    ("Blue", Rgb::new(0, 0, 255)),
    ("Yellow", Rgb::new(255, 255, 0)),
    ("Cyan", Rgb::new(0, 255, 255)),
    ("Magenta", Rgb::new(255, 0, 255)),
    ("Silver", Rgb::new(192, 192, 192)),
    ("Gray", Rgb::new(128, 128, 128)),
    ("Maroon", Rgb::new(128, 0, 0)),
    ("Olive", Rgb::new(128, 128, 0)),
    ("Green", Rgb::new(0, 128, 0)),
    ("Purple", Rgb::new(128, 0, 128)),
    ("Teal", Rgb::new(0, 128, 128)),
    ("Navy", Rgb::new(0, 0, 128)),
];

/// Index into [`REFERENCE_PALETTE`] of the reference color nearest to `color`
///
/// Earlier palette entries win exact distance ties.
pub fn nearest_reference(color: Rgb) -> usize {
    let mut best = 0;
    let mut best_distance = u32::MAX;
    for (index, (_, reference)) in REFERENCE_PALETTE.iter().enumerate() {
        let distance = color.distance_squared(*reference);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}
