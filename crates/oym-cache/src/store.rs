//! Incremental cache over compiled outputs.
//!
//! [`IncrementalCache`] is rooted at the output directory. Every saved output
//! gets a [`FileEntry`] in `{root}/.cache-meta.json`, keyed by its path
//! relative to the root. All metadata read-modify-write cycles go through a
//! single mutex, and the store file is always replaced atomically.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::metadata::{
    BuildStats, CacheMetadata, CacheStats, FileEntry, IntegrityReport, METADATA_FILENAME,
    RecordedBuildStats, timestamp_now,
};
use crate::write::write_json_atomic;
use crate::{CacheError, hash};

/// A value the cache can persist and index.
pub trait CacheRecord: Serialize {
    /// Metadata entry describing this record.
    fn cache_entry(&self) -> FileEntry;

    /// Structural problems of a stored record, checked by
    /// [`IncrementalCache::validate_integrity`]. Empty when well-formed.
    fn integrity_issues(_value: &serde_json::Value) -> Vec<String> {
        Vec::new()
    }
}

/// Content-hash based cache of compiled outputs.
pub struct IncrementalCache {
    root: PathBuf,
    meta_path: PathBuf,
    state: Mutex<CacheMetadata>,
}

impl IncrementalCache {
    /// Open the cache rooted at `root`.
    ///
    /// A missing or unreadable metadata file yields an empty cache.
    #[must_use]
    pub fn open(root: PathBuf) -> Self {
        let meta_path = root.join(METADATA_FILENAME);
        let metadata = load_metadata(&meta_path);
        tracing::debug!(
            path = %meta_path.display(),
            entries = metadata.files.len(),
            "opened cache"
        );
        Self {
            root,
            meta_path,
            state: Mutex::new(metadata),
        }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the metadata store.
    #[must_use]
    pub fn metadata_path(&self) -> &Path {
        &self.meta_path
    }

    /// Whether `output` is a valid compilation of the current `source`.
    ///
    /// Answers false when the output is missing, older than the source, not
    /// indexed, or indexed with a different source hash. I/O errors answer
    /// false.
    #[must_use]
    pub fn is_up_to_date(&self, source: &Path, output: &Path) -> bool {
        let Ok(output_meta) = fs::metadata(output) else {
            tracing::debug!(output = %output.display(), "cache miss: output absent");
            return false;
        };
        let Ok(source_meta) = fs::metadata(source) else {
            return false;
        };
        match (output_meta.modified(), source_meta.modified()) {
            (Ok(out), Ok(src)) if out < src => {
                tracing::debug!(output = %output.display(), "cache miss: source is newer");
                return false;
            }
            (Ok(_), Ok(_)) => {}
            _ => return false,
        }

        let key = self.key_for(output);
        let Some(stored) = self
            .lock()
            .files
            .get(&key)
            .map(|entry| entry.source_hash.clone())
        else {
            tracing::debug!(key, "cache miss: no metadata entry");
            return false;
        };

        match hash::hash_file(source) {
            Ok(live) if live == stored => true,
            Ok(_) => {
                tracing::debug!(key, "cache miss: source hash changed");
                false
            }
            Err(_) => false,
        }
    }

    /// Write `record` to `output` and upsert its metadata entry.
    pub fn save<T: CacheRecord>(&self, output: &Path, record: &T) -> Result<(), CacheError> {
        write_json_atomic(output, record)?;

        let key = self.key_for(output);
        let mut entry = record.cache_entry();
        let now = timestamp_now();
        if entry.updated_at.is_empty() {
            entry.updated_at.clone_from(&now);
        }

        let mut state = self.lock();
        if entry.created_at.is_empty() {
            entry.created_at = state
                .files
                .get(&key)
                .map(|prev| prev.created_at.clone())
                .filter(|created| !created.is_empty())
                .unwrap_or(now);
        }
        state.files.insert(key, entry);
        state.total_exercises = state.files.len();
        write_json_atomic(&self.meta_path, &*state)
    }

    /// Read a cached output back. Any failure yields `None`.
    #[must_use]
    pub fn load<T: DeserializeOwned>(&self, output: &Path) -> Option<T> {
        let content = fs::read_to_string(output).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Metadata entry for `output`, if indexed.
    #[must_use]
    pub fn entry(&self, output: &Path) -> Option<FileEntry> {
        self.lock().files.get(&self.key_for(output)).cloned()
    }

    /// Record the outcome of a build run.
    pub fn update_metadata(&self, stats: BuildStats) -> Result<(), CacheError> {
        let now = timestamp_now();
        let mut state = self.lock();
        state.last_update.clone_from(&now);
        state.total_exercises = state.files.len();
        state.build_stats = Some(RecordedBuildStats {
            stats,
            timestamp: now,
        });
        write_json_atomic(&self.meta_path, &*state)
    }

    /// Drop entries whose output file no longer exists.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> Result<usize, CacheError> {
        let mut state = self.lock();
        let before = state.files.len();
        state.files.retain(|key, _| self.root.join(key).exists());
        let removed = before - state.files.len();

        if removed > 0 {
            tracing::info!(removed, "removed stale cache entries");
            state.total_exercises = state.files.len();
            write_json_atomic(&self.meta_path, &*state)?;
        }
        Ok(removed)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            total_files: state.files.len(),
            last_update: state.last_update.clone(),
            version: state.version.clone(),
            build_stats: state.build_stats.clone(),
        }
    }

    /// Check every indexed output against its metadata entry.
    ///
    /// Each stored record must parse, carry the indexed id and a well-formed
    /// source hash equal to the indexed one, and pass
    /// [`CacheRecord::integrity_issues`] for `T`.
    #[must_use]
    pub fn validate_integrity<T: CacheRecord>(&self) -> IntegrityReport {
        let files = self.lock().files.clone();
        let mut report = IntegrityReport {
            issues: Vec::new(),
            total_files: files.len(),
        };

        for (key, entry) in &files {
            let Some(value) = self.load::<serde_json::Value>(&self.root.join(key)) else {
                report.issues.push(format!("{key}: cached file is missing or unreadable"));
                continue;
            };

            let id = value
                .get("id")
                .or_else(|| value.get("uuid"))
                .and_then(serde_json::Value::as_str);
            if id != Some(entry.id.as_str()) {
                report.issues.push(format!("{key}: id mismatch"));
            }

            if !hash::is_valid_hash(&entry.source_hash) {
                report.issues.push(format!("{key}: indexed source hash is malformed"));
            }
            match value.get("source_hash").and_then(serde_json::Value::as_str) {
                Some(stored) if !hash::is_valid_hash(stored) => {
                    report.issues.push(format!("{key}: source hash is malformed"));
                }
                Some(stored)
                    if hash::normalize_hash(stored) == hash::normalize_hash(&entry.source_hash) => {}
                _ => report.issues.push(format!("{key}: source hash mismatch")),
            }

            report.issues.extend(
                T::integrity_issues(&value)
                    .into_iter()
                    .map(|issue| format!("{key}: {issue}")),
            );
        }

        report
    }

    /// Metadata key for `output`: path relative to the root, `/`-separated.
    fn key_for(&self, output: &Path) -> String {
        let relative = output.strip_prefix(&self.root).unwrap_or(output);
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn lock(&self) -> MutexGuard<'_, CacheMetadata> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_metadata(path: &Path) -> CacheMetadata {
    let Ok(content) = fs::read_to_string(path) else {
        return CacheMetadata::default();
    };
    match serde_json::from_str(&content) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable cache metadata: {e}");
            CacheMetadata::default()
        }
    }
}
