//! Error types for the sync layer.

use arkivo_consensus::ConsensusError;
use arkivo_peer::PeerError;
use arkivo_types::ConflictId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A peer-layer failure (unreachable, channel closed, ...).
    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    /// A consensus or validation contract violation.
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// The local store rejected a read or write.
    #[error("store error: {0}")]
    Store(String),

    /// A resolution could not be written back; the conflict stays pending.
    #[error("conflict apply failed: {0}")]
    ApplyFailed(String),

    /// No pending conflict with this id.
    #[error("unknown conflict: {0}")]
    UnknownConflict(ConflictId),

    /// A peer replied with something the protocol does not allow here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed configuration, rejected at startup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A bounded wait elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The coordinator is shutting down; in-flight work was cancelled.
    #[error("shutting down")]
    ShuttingDown,
}

impl SyncError {
    /// Whether retrying with backoff is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Peer(PeerError::Unreachable(_) | PeerError::ChannelClosed) | Self::Timeout
        )
    }
}
