//! Error types for voting and validation.

use arkivo_types::{ConsensusId, RequestId};
use thiserror::Error;

/// Result type for consensus and validation operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors that can occur in consensus and validation operations.
///
/// All of these are synchronous contract violations, rejected at the call
/// site; none of them corrupts in-progress vote or validation state.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A consensus is already open for this (topic, cultural origin) pair.
    #[error("a consensus is already open for topic '{0}'")]
    DuplicateTopic(String),

    /// The consensus has closed; late votes are rejected.
    #[error("consensus {0} is closed")]
    Closed(ConsensusId),

    /// No consensus with this id exists.
    #[error("unknown consensus: {0}")]
    UnknownConsensus(ConsensusId),

    /// The vote names an option the topic was not opened with.
    #[error("unknown option '{option}' for consensus {id}")]
    UnknownOption { id: ConsensusId, option: String },

    /// A vote needs at least two options to be meaningful.
    #[error("a consensus needs at least two options")]
    NotEnoughOptions,

    /// No validation request with this id exists.
    #[error("unknown validation request: {0}")]
    UnknownRequest(RequestId),

    /// A validation request with this id is already registered.
    #[error("validation request {0} already registered")]
    DuplicateRequest(RequestId),

    /// Malformed configuration, rejected at startup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
