//! Hashing Utilities

use sha2::{Digest, Sha256};

use crate::types::MemoryEntry;

/// SHA-256 of text as lowercase hex
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of an entry's rendered content.
///
/// Entries whose content renders to the same text share a fingerprint even
/// when their ids, tags or types differ.
pub fn content_fingerprint(entry: &MemoryEntry) -> String {
    content_hash(&entry.content_text())
}
