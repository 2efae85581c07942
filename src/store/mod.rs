//! Persistent tile metadata

/// Namespaced tile store on the embedded database
pub mod database;
/// Stored record format and content hashing
pub mod record;
/// Load-time validation and cleanup of stale records
pub mod validation;
