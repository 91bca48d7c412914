//! Content hashing for collection versions.
//!
//! A version's hash is a SHA-256 digest of its serialized data, so equal
//! data always produces an equal hash. This is what separates true replica
//! divergence from a no-op sync.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes raw bytes.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Hashes a JSON value through its canonical string form.
    /// `serde_json` keeps object keys sorted, so equal values serialize
    /// identically regardless of construction order.
    #[must_use]
    pub fn of_value(value: &serde_json::Value) -> Self {
        Self::of(value.to_string().as_bytes())
    }

    /// Wraps an already hex-encoded digest, e.g. one received on the wire.
    pub fn from_hex(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
