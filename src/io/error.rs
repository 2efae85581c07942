//! Error types and path context for mosaic operations

use crate::math::color::Rgb;
use std::fmt;
use std::path::{Path, PathBuf};

/// Main error type for all mosaic operations
#[derive(Debug)]
pub enum MosaicError {
    /// Failed to decode an image from the filesystem
    ImageLoad {
        /// Path to the image file
        path: PathBuf,
        /// Underlying image decoding error
        source: image::ImageError,
    },

    /// Failed to encode or save the generated image
    ImageExport {
        /// Path where export was attempted
        path: PathBuf,
        /// Underlying image encoding error
        source: image::ImageError,
    },

    /// General file system operation failure
    FileSystem {
        /// Path involved in the operation
        path: PathBuf,
        /// Description of the operation that failed
        operation: &'static str,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration or argument validation failed
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: &'static str,
        /// Provided value that failed validation
        value: String,
        /// Explanation of why the value is invalid
        reason: String,
    },

    /// The metadata store rejected an operation
    Store {
        /// Store operation being performed
        operation: &'static str,
        /// Underlying storage engine error
        source: redb::Error,
    },

    /// A persisted record could not be decoded
    CorruptRecord {
        /// Store key of the record
        key: String,
        /// Decoder failure description
        reason: String,
    },

    /// A tile is smaller than the configured tile size after cropping
    TileTooSmall {
        /// Path to the tile
        path: PathBuf,
        /// Edge length of the square crop
        side: u32,
        /// Required edge length
        required: u32,
    },

    /// The namespace holds no usable tiles
    EmptyLibrary {
        /// Namespace table that was searched
        namespace: String,
    },

    /// No stored tile could be matched against a color
    NoCandidates {
        /// Query color
        color: Rgb,
    },

    /// Estimated output size exceeds the configured limit
    OutputTooLarge {
        /// Estimated canvas size in bytes
        required_bytes: u64,
        /// Configured maximum in bytes
        limit_bytes: u64,
    },

    /// A worker pool could not be started or lost a worker
    WorkerPool {
        /// Description of the failure
        reason: String,
    },
}

impl fmt::Display for MosaicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageLoad { path, source } => {
                write!(f, "Failed to load image '{}': {source}", path.display())
            }
            Self::ImageExport { path, source } => {
                write!(
                    f,
                    "Failed to export image to '{}': {source}",
                    path.display()
                )
            }
            Self::FileSystem {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "File system error during {operation} on '{}': {source}",
                    path.display()
                )
            }
            Self::InvalidParameter {
                parameter,
                value,
                reason,
            } => {
                write!(f, "Invalid parameter '{parameter}' = '{value}': {reason}")
            }
            Self::Store { operation, source } => {
                write!(f, "Store error during {operation}: {source}")
            }
            Self::CorruptRecord { key, reason } => {
                write!(f, "Corrupt store record '{key}': {reason}")
            }
            Self::TileTooSmall {
                path,
                side,
                required,
            } => {
                write!(
                    f,
                    "Tile '{}' is too small ({side}px, need {required}px)",
                    path.display()
                )
            }
            Self::EmptyLibrary { namespace } => {
                write!(f, "No tiles available in namespace '{namespace}'")
            }
            Self::NoCandidates { color } => {
                write!(f, "No tile candidates for color ({color})")
            }
            Self::OutputTooLarge {
                required_bytes,
                limit_bytes,
            } => {
                write!(
                    f,
                    "Output needs {required_bytes} bytes, more than the {limit_bytes} byte limit"
                )
            }
            Self::WorkerPool { reason } => {
                write!(f, "Worker pool failure: {reason}")
            }
        }
    }
}

impl std::error::Error for MosaicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ImageLoad { source, .. } | Self::ImageExport { source, .. } => Some(source),
            Self::FileSystem { source, .. } => Some(source),
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for mosaic results
pub type Result<T> = std::result::Result<T, MosaicError>;

impl From<image::ImageError> for MosaicError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageLoad {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

impl From<std::io::Error> for MosaicError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("<unknown>"),
            operation: "unknown",
            source: err,
        }
    }
}

/// Attaches the path being worked on to errors converted without one
pub trait WithPath<T> {
    /// Replace an unknown path in the error with `path`
    ///
    /// # Errors
    ///
    /// Propagates the original error with the path applied
    fn with_path(self, path: &Path) -> Result<T>;

    /// Replace an unknown path and operation in a file system error
    ///
    /// # Errors
    ///
    /// Propagates the original error with path and operation applied
    fn with_file_operation(self, path: &Path, operation: &'static str) -> Result<T>;
}

impl<T, E> WithPath<T> for std::result::Result<T, E>
where
    E: Into<MosaicError>,
{
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();
            match &mut error {
                MosaicError::ImageLoad { path: p, .. }
                | MosaicError::ImageExport { path: p, .. }
                | MosaicError::FileSystem { path: p, .. } => {
                    *p = path.to_path_buf();
                }
                _ => {}
            }
            error
        })
    }

    fn with_file_operation(self, path: &Path, operation: &'static str) -> Result<T> {
        self.with_path(path).map_err(|mut error| {
            if let MosaicError::FileSystem { operation: op, .. } = &mut error {
                *op = operation;
            }
            error
        })
    }
}

/// Create an invalid parameter error
pub fn invalid_parameter(
    parameter: &'static str,
    value: &impl ToString,
    reason: &impl ToString,
) -> MosaicError {
    MosaicError::InvalidParameter {
        parameter,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Wrap a storage engine error with the store operation that produced it
///
/// Intended for `map_err`: `.map_err(store_error("begin write"))?`
pub fn store_error<E>(operation: &'static str) -> impl FnOnce(E) -> MosaicError
where
    E: Into<redb::Error>,
{
    move |source| MosaicError::Store {
        operation,
        source: source.into(),
    }
}

/// Create a worker pool error
pub fn worker_pool_error(reason: &impl ToString) -> MosaicError {
    MosaicError::WorkerPool {
        reason: reason.to_string(),
    }
}
