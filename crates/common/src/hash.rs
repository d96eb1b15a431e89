//! Content hashing for emitted artifacts.

use sha2::{Digest, Sha256};

/// SHA-256 of the given text, lowercase hex.
///
/// Used for the output manifest and for the unchanged-file check in
/// post-processing, so the digest must be stable across platforms: hashing
/// operates on the UTF-8 bytes exactly as they will be written.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
