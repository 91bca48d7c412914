//! Core type definitions for Arkivo.
//!
//! This crate defines the fundamental types shared by every component of the
//! collection-sync core:
//! - Collection, peer, conflict, request, and consensus identifiers (UUID v7)
//! - Hybrid Logical Clock timestamps
//! - Bounded `[0,1]` scores for reputation, confidence, and consensus
//! - Content hashes and the immutable `CollectionVersion` replication unit
//!
//! Component-specific types (peer records, conflict records, vote records)
//! belong to their respective crates, not here.

mod hash;
mod ids;
mod score;
mod timestamp;
mod version;

pub use hash::ContentHash;
pub use ids::{CollectionId, ConflictId, ConsensusId, PeerId, RequestId};
pub use score::Score;
pub use timestamp::HybridTimestamp;
pub use version::{CollectionVersion, ValidationState, ValidationStatus};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
