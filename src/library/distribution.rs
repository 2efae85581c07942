//! Operator diagnostics on how the library's tile colors are distributed
//!
//! Nothing here feeds back into matching; the report only tells the operator
//! which colors the library covers well and which it lacks.

use crate::math::color::{COLOR_SPACE_SIZE, REFERENCE_PALETTE, Rgb, nearest_reference};
use crate::store::record::TileRecord;
use tracing::info;

/// Dense tile count per 24-bit color, addressed by [`Rgb::packed`]
///
/// Allocated once at full size so every access is a plain index with no
/// hashing or growth.
pub struct ColorHistogram {
    counts: Vec<u32>,
}

impl Default for ColorHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorHistogram {
    /// Create a histogram with every count at zero
    pub fn new() -> Self {
        Self {
            counts: vec![0; COLOR_SPACE_SIZE],
        }
    }

    /// Count one more tile of `color`, returning the new count
    pub fn add(&mut self, color: Rgb) -> u32 {
        self.counts
            .get_mut(color.packed() as usize)
            .map_or(0, |count| {
                *count += 1;
                *count
            })
    }

    /// Number of tiles counted for `color`
    pub fn count(&self, color: Rgb) -> u32 {
        self.counts
            .get(color.packed() as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Colors with at least one tile, in packed-key order
    pub fn occupied(&self) -> impl Iterator<Item = (Rgb, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(key, &count)| (Rgb::from_packed(key as u32), count))
    }
}

/// How many distinct colors share a given tile count
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountBucket {
    /// Tiles per color
    pub tiles_per_color: u32,
    /// Number of colors with exactly that many tiles
    pub colors: usize,
    /// The color itself when it is the only one with this count
    pub sole_color: Option<Rgb>,
}

/// Tile distribution summary for one namespace
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Total tiles counted
    pub total: usize,
    /// Distinct average colors
    pub distinct_colors: usize,
    /// Highest number of tiles sharing one average color
    pub max_per_color: u32,
    /// Distribution of tiles-per-color, ascending, occupied counts only
    pub buckets: Vec<CountBucket>,
    /// Tiles per reference color, in [`REFERENCE_PALETTE`] order
    pub groups: Vec<(&'static str, usize)>,
}

impl DistributionReport {
    /// Build the report from a set of records
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a TileRecord>,
    {
        let mut histogram = ColorHistogram::new();
        let mut total = 0;
        let mut max_per_color = 0;
        for record in records {
            max_per_color = max_per_color.max(histogram.add(record.color));
            total += 1;
        }
        Self::from_histogram(&histogram, total, max_per_color)
    }

    fn from_histogram(histogram: &ColorHistogram, total: usize, max_per_color: u32) -> Self {
        let mut per_count = vec![(0_usize, None); max_per_color as usize + 1];
        let mut groups: Vec<(&'static str, usize)> = REFERENCE_PALETTE
            .iter()
            .map(|&(name, _)| (name, 0))
            .collect();
        let mut distinct_colors = 0;

        for (color, count) in histogram.occupied() {
            distinct_colors += 1;
            if let Some((colors, sole)) = per_count.get_mut(count as usize) {
                *colors += 1;
                *sole = Some(color);
            }
            if let Some((_, tiles)) = groups.get_mut(nearest_reference(color)) {
                *tiles += count as usize;
            }
        }

        let buckets = per_count
            .into_iter()
            .enumerate()
            .filter(|&(_, (colors, _))| colors > 0)
            .map(|(tiles_per_color, (colors, sole))| CountBucket {
                tiles_per_color: tiles_per_color as u32,
                colors,
                sole_color: if colors == 1 { sole } else { None },
            })
            .collect();

        Self {
            total,
            distinct_colors,
            max_per_color,
            buckets,
            groups,
        }
    }

    /// Reference color holding the most tiles; earlier entries win ties
    pub fn dominant_group(&self) -> Option<(&'static str, usize)> {
        self.groups
            .iter()
            .copied()
            .fold(None, |best, group| match best {
                Some((_, tiles)) if tiles >= group.1 => best,
                _ => Some(group),
            })
    }

    /// Write the report to the log
    pub fn log(&self) {
        info!(
            total = self.total,
            distinct_colors = self.distinct_colors,
            max_per_color = self.max_per_color,
            "library color distribution"
        );
        for bucket in &self.buckets {
            match bucket.sole_color {
                Some(color) => info!(
                    "avg color num distribution {} = {} ({color})",
                    bucket.tiles_per_color, bucket.colors
                ),
                None => info!(
                    "avg color num distribution {} = {}",
                    bucket.tiles_per_color, bucket.colors
                ),
            }
        }
        for (name, tiles) in &self.groups {
            info!("avg color group distribution {name} = {tiles}");
        }
        if let Some((name, tiles)) = self.dominant_group() {
            info!("avg color group max {name} {tiles}");
        }
    }
}
