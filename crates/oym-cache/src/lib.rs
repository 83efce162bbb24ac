//! Incremental build cache for OYM.
//!
//! This crate owns everything that decides whether a compiled exercise is
//! still valid for its source:
//!
//! - [`hash`]: SHA-256 content hashing of files, strings and serializable values
//! - [`CacheMetadata`]: the persisted `.cache-meta.json` mapping
//! - [`IncrementalCache`]: up-to-date checks and record persistence
//! - [`write_json_atomic`]: temp-file + rename writes shared by every output
//!
//! # Example
//!
//! ```ignore
//! use oym_cache::IncrementalCache;
//!
//! let cache = IncrementalCache::open("cache/exercises".into());
//! if !cache.is_up_to_date(source, output) {
//!     cache.save(output, &document)?;
//! }
//! ```

pub mod hash;
mod metadata;
mod store;
mod write;

pub use metadata::{
    BuildStats, CacheMetadata, CacheStats, FileEntry, IntegrityReport, METADATA_FILENAME,
    METADATA_VERSION, RecordedBuildStats, timestamp_now,
};
pub use store::{CacheRecord, IncrementalCache};
pub use write::{write_atomic, write_json_atomic};

use std::path::PathBuf;

/// Error raised by cache persistence.
///
/// Lookups never fail: an unreadable cache is an empty cache. Only writes
/// surface errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error with the offending path.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
