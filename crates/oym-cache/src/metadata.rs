//! Persisted cache metadata (`.cache-meta.json`).

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::HASH_ALGORITHM;

/// Schema version written to new metadata files.
pub const METADATA_VERSION: &str = "1.0.0";

/// Metadata filename inside the cache root.
pub const METADATA_FILENAME: &str = ".cache-meta.json";

/// Current UTC time as an RFC 3339 string with millisecond precision.
#[must_use]
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The whole metadata store.
///
/// Keys of [`files`](Self::files) are output paths relative to the cache root,
/// always with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: String,
    #[serde(default)]
    pub last_update: String,
    #[serde(default)]
    pub total_exercises: usize,
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_stats: Option<RecordedBuildStats>,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION.to_owned(),
            last_update: String::new(),
            total_exercises: 0,
            hash_algorithm: default_hash_algorithm(),
            files: BTreeMap::new(),
            build_stats: None,
        }
    }
}

fn default_hash_algorithm() -> String {
    HASH_ALGORITHM.to_owned()
}

/// Metadata recorded for one compiled output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Hash of the source the output was compiled from.
    pub source_hash: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    /// Exercise identifier.
    #[serde(alias = "uuid", default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Counters for one build run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// [`BuildStats`] as stored, stamped with the time of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedBuildStats {
    #[serde(flatten)]
    pub stats: BuildStats,
    #[serde(default)]
    pub timestamp: String,
}

/// Summary returned by [`IncrementalCache::stats`](crate::IncrementalCache::stats).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_files: usize,
    pub last_update: String,
    pub version: String,
    pub build_stats: Option<RecordedBuildStats>,
}

/// Result of [`IncrementalCache::validate_integrity`](crate::IncrementalCache::validate_integrity).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub issues: Vec<String>,
    pub total_files: usize,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}
