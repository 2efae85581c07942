//! Persisted per-tile metadata and its binary encoding

use crate::io::error::{MosaicError, Result};
use crate::math::color::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A 128-bit XXH3 digest of a tile file's raw bytes
///
/// Used to notice that a tile changed on disk since it was indexed without
/// keeping a copy of the file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hash a byte slice with XXH3-128
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data).to_le_bytes())
    }

    /// The raw digest
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

/// Average color and content hash of one library tile
///
/// Keyed in the store by `path`, which is always absolute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Absolute path of the tile file
    pub path: String,
    /// Mean color of the cropped, resized tile
    pub color: Rgb,
    /// Digest of the file bytes the color was computed from
    pub hash: ContentHash,
}

impl TileRecord {
    /// Tile path as a filesystem path
    pub fn file_path(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Serialize for storage
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::CorruptRecord`] if serialization fails
    pub fn encode(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        bincode::serde::encode_to_vec(self, config).map_err(|e| MosaicError::CorruptRecord {
            key: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Deserialize a stored value, checking it belongs under `key`
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::CorruptRecord`] if the bytes do not decode or
    /// the embedded path does not match the key
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        let config = bincode::config::standard();
        let decoded = bincode::serde::decode_from_slice::<Self, _>(bytes, config);
        let (record, _) = decoded.map_err(|e| MosaicError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        if record.path != key {
            return Err(MosaicError::CorruptRecord {
                key: key.to_string(),
                reason: format!("record is for '{}'", record.path),
            });
        }

        Ok(record)
    }
}
