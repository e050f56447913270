//! Content hashing for change detection.
//!
//! Records are compared before and after an import applies remote values by
//! hashing their serialized JSON, so an unchanged record is never saved.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a SHA256 hash of a serializable value.
///
/// # Panics
///
/// Panics if the value cannot be serialized to JSON. Record snapshots are
/// plain maps and strings, so this does not happen in practice.
#[must_use]
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).expect("serialization should not fail");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}
