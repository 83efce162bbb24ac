//! Content hashing.
//!
//! Every digest is hex-encoded SHA-256. The algorithm name is recorded in the
//! metadata store as [`HASH_ALGORITHM`] so a future change can be detected.

use std::io;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Algorithm name written to `hash_algorithm` in the metadata store.
pub const HASH_ALGORITHM: &str = "sha256";

/// Hash raw bytes.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Hash a UTF-8 string.
#[must_use]
pub fn hash_str(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

/// Hash the raw bytes of a file.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Hash a value through its compact JSON serialization.
///
/// Field order follows the struct definition, so two equal values always
/// produce the same digest.
pub fn hash_object<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}

/// First `len` hex characters of the content hash.
#[must_use]
pub fn short_hash(content: &str, len: usize) -> String {
    let mut hash = hash_str(content);
    hash.truncate(len);
    hash
}

/// Trim and lowercase a digest read from outside the cache.
#[must_use]
pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

/// Whether `hash` is a SHA-256 hex digest once normalized.
#[must_use]
pub fn is_valid_hash(hash: &str) -> bool {
    let hash = normalize_hash(hash);
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Check a file against an expected digest.
pub fn validate_file_hash(path: &Path, expected: &str) -> io::Result<bool> {
    Ok(hash_file(path)? == normalize_hash(expected))
}

/// Whether two files have identical content.
pub fn compare_file_hashes(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(hash_file(a)? == hash_file(b)?)
}
