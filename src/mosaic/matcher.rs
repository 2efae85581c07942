//! Nearest-color tile matching with a per-color candidate cache
//!
//! A lookup for a color that has not been resolved yet scans every record in
//! the store. To keep concurrent workers from repeating that scan for the same
//! color, each color has its own cache entry with its own population lock:
//! the first worker scans while the others wait on that entry only, then find
//! it populated when they get the lock. Unrelated colors never contend.

use crate::io::error::{MosaicError, Result};
use crate::io::image::{ScaleAlgorithm, load_tile};
use crate::math::color::Rgb;
use crate::store::database::TileStore;
use crate::store::record::TileRecord;
use dashmap::DashMap;
use image::RgbaImage;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Prepared tile images tied for the best match of one color
pub type Candidates = Arc<[Arc<RgbaImage>]>;

/// Tiles whose average color is nearest to a query color
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NearestTiles {
    /// The best average color found
    pub color: Rgb,
    /// Squared distance from the query to [`NearestTiles::color`]
    pub distance_squared: u32,
    /// Paths of every tile with exactly that average color, in scan order
    pub paths: Vec<String>,
}

/// Incremental nearest-color search over a stream of records
///
/// A record strictly closer than the current best replaces the tie set; a
/// record with exactly the best color joins it. Records at the same distance
/// with a different color do not tie, so the first color seen wins.
pub struct NearestSearch {
    query: Rgb,
    best: Option<NearestTiles>,
}

impl NearestSearch {
    /// Start a search for `query`
    pub const fn new(query: Rgb) -> Self {
        Self { query, best: None }
    }

    /// Consider one record
    pub fn offer(&mut self, record: TileRecord) {
        let distance_squared = self.query.distance_squared(record.color);
        match &mut self.best {
            Some(best) if record.color == best.color => best.paths.push(record.path),
            Some(best) if distance_squared >= best.distance_squared => {}
            _ => {
                self.best = Some(NearestTiles {
                    color: record.color,
                    distance_squared,
                    paths: vec![record.path],
                });
            }
        }
    }

    /// The best tie set, or `None` if no record was offered
    pub fn finish(self) -> Option<NearestTiles> {
        self.best
    }
}

/// Find the nearest tiles to `query` among `records`
pub fn nearest_tiles<I>(query: Rgb, records: I) -> Option<NearestTiles>
where
    I: IntoIterator<Item = TileRecord>,
{
    let mut search = NearestSearch::new(query);
    for record in records {
        search.offer(record);
    }
    search.finish()
}

/// Cached match state for one source color
pub struct MatchEntry {
    frequency: u32,
    lookups: AtomicU32,
    candidates: OnceLock<Candidates>,
    population: Mutex<()>,
}

impl MatchEntry {
    const fn new(frequency: u32) -> Self {
        Self {
            frequency,
            lookups: AtomicU32::new(0),
            candidates: OnceLock::new(),
            population: Mutex::new(()),
        }
    }

    /// How often the color occurred in the source pre-analysis (0 if not seeded)
    pub const fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Number of times the color has been resolved this run
    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Resolved candidates, once populated
    pub fn candidates(&self) -> Option<&Candidates> {
        self.candidates.get()
    }

    /// Whether the entry has been populated
    pub fn is_populated(&self) -> bool {
        self.candidates.get().is_some()
    }
}

/// Process-lifetime cache from source color to resolved candidates
///
/// Bounded by the number of distinct source colors; nothing is evicted.
#[derive(Default)]
pub struct MatchCache {
    entries: DashMap<Rgb, Arc<MatchEntry>>,
    hits: AtomicU64,
    scans: AtomicU64,
}

impl MatchCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for a frequent color up front
    ///
    /// Gives every worker that meets this color the same lock to wait on.
    /// Seeding an existing color leaves it unchanged.
    pub fn seed(&self, color: Rgb, frequency: u32) {
        self.entries
            .entry(color)
            .or_insert_with(|| Arc::new(MatchEntry::new(frequency)));
    }

    /// The entry for `color`, created empty on first use
    pub fn entry(&self, color: Rgb) -> Arc<MatchEntry> {
        if let Some(entry) = self.entries.get(&color) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.entries
                .entry(color)
                .or_insert_with(|| Arc::new(MatchEntry::new(0)))
                .value(),
        )
    }

    /// Number of colors with an entry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no color has an entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that have been populated
    pub fn populated(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_populated())
            .count()
    }

    /// Log the frequency and lookup count of every populated entry
    pub fn log_entries(&self) {
        for item in &self.entries {
            let entry = item.value();
            let Some(candidates) = entry.candidates() else {
                continue;
            };
            debug!(
                color = %item.key(),
                frequency = entry.frequency(),
                lookups = entry.lookups(),
                candidates = candidates.len(),
                "match cache entry"
            );
        }
    }

    /// Lookups answered from an already populated entry
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Full store scans performed
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }
}

/// Result of resolving one color
pub struct Resolution {
    /// Tiles tied for the best match
    pub candidates: Candidates,
    /// Whether the answer came from an already populated entry
    pub cached: bool,
}

/// Resolves source colors to tile candidates from the store
pub struct MatchEngine {
    store: Arc<TileStore>,
    cache: Arc<MatchCache>,
    pixel_size: u32,
    scale: ScaleAlgorithm,
}

impl MatchEngine {
    /// Create an engine preparing tiles at `pixel_size`
    pub const fn new(
        store: Arc<TileStore>,
        cache: Arc<MatchCache>,
        pixel_size: u32,
        scale: ScaleAlgorithm,
    ) -> Self {
        Self {
            store,
            cache,
            pixel_size,
            scale,
        }
    }

    /// The candidate cache
    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    /// Resolve `color` to the tiles with the nearest average color
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::CorruptRecord`] or a store error if the scan
    /// fails, [`MosaicError::NoCandidates`] if the store is empty, or the
    /// error from preparing a candidate tile. A failed resolution leaves the
    /// entry empty so a later lookup tries again.
    pub fn resolve(&self, color: Rgb) -> Result<Resolution> {
        let entry = self.cache.entry(color);
        entry.lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(candidates) = entry.candidates() {
            return Ok(self.hit(candidates));
        }

        let _population = entry.population.lock();
        // another worker may have populated it while this one waited
        if let Some(candidates) = entry.candidates() {
            return Ok(self.hit(candidates));
        }

        let candidates = self.scan(color)?;
        let stored = entry.candidates.get_or_init(|| candidates);
        Ok(Resolution {
            candidates: Arc::clone(stored),
            cached: false,
        })
    }

    fn hit(&self, candidates: &Candidates) -> Resolution {
        self.cache.hits.fetch_add(1, Ordering::Relaxed);
        Resolution {
            candidates: Arc::clone(candidates),
            cached: true,
        }
    }

    fn scan(&self, color: Rgb) -> Result<Candidates> {
        self.cache.scans.fetch_add(1, Ordering::Relaxed);

        let mut search = NearestSearch::new(color);
        self.store.for_each_record(|record| search.offer(record))?;
        let nearest = search.finish().ok_or(MosaicError::NoCandidates { color })?;

        debug!(
            query = %color,
            best = %nearest.color,
            distance = color.distance(nearest.color),
            ties = nearest.paths.len(),
            "color matched"
        );

        let tiles = nearest
            .paths
            .iter()
            .map(|path| load_tile(Path::new(path), self.pixel_size, self.scale).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(tiles.into())
    }
}

/// Deterministic random source for one mosaic cell
///
/// Derived from the run seed and the cell position, so the same seed gives
/// the same mosaic regardless of which worker renders which cell.
pub fn cell_rng(seed: u64, x: u32, y: u32) -> StdRng {
    let position = (u64::from(y) << 32) | u64::from(x);
    StdRng::seed_from_u64(seed ^ position.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Pick one of `count` candidates uniformly and decide on a horizontal flip
///
/// Returns `None` when there are no candidates.
pub fn choose_variant<R: Rng>(count: usize, rng: &mut R) -> Option<(usize, bool)> {
    if count == 0 {
        return None;
    }
    Some((rng.random_range(0..count), rng.random_bool(0.5)))
}
