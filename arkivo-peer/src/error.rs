//! Error types for the peer layer.

use arkivo_types::PeerId;
use thiserror::Error;

/// Result type for peer operations.
pub type PeerResult<T> = Result<T, PeerError>;

/// Errors that can occur in peer operations.
#[derive(Debug, Error)]
pub enum PeerError {
    /// No channel could be established within the connect deadline.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// The channel dropped mid-exchange.
    #[error("channel closed")]
    ChannelClosed,

    /// The peer is not in the registry.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// Admitting the peer would exceed the configured table size.
    #[error("peer table at capacity ({0} peers)")]
    AtCapacity(usize),

    /// Malformed configuration, rejected at startup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
