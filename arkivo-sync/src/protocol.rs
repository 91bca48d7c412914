//! Sync protocol messages.
//!
//! Logical messages only — byte framing and encryption belong to the
//! transport collaborator. The exchange model is request-response:
//! 1. Peers exchange version summaries (hash, timestamp, lineage)
//! 2. Divergent versions are fetched in full to materialize a conflict
//! 3. Validation requests and votes ride the same channel

use crate::conflict::ResolutionStrategy;
use arkivo_consensus::CulturalValidationRequest;
use arkivo_types::{
    CollectionId, CollectionVersion, ConflictId, ConsensusId, ContentHash, HybridTimestamp,
    PeerId, RequestId, Score, ValidationState,
};
use serde::{Deserialize, Serialize};

/// Protocol version, advertised by the transport collaborator during its
/// handshake and echoed in `ErrorMessage::version_mismatch`.
pub const PROTOCOL_VERSION: u32 = 1;

/// A sync protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Ask a peer for its version summary of a collection.
    SummaryRequest(SummaryRequestMessage),

    /// Reply with the summary, or nothing if the peer dropped the
    /// collection.
    SummaryResponse(SummaryResponseMessage),

    /// Ask a peer for a specific full version.
    VersionRequest(VersionRequestMessage),

    /// Reply with the full version if still held.
    VersionResponse(VersionResponseMessage),

    /// Announce a detected conflict and the suggested resolution.
    ConflictProposal(ConflictProposalMessage),

    /// Forward a cultural-validation request to a validator.
    ValidationRequest(ValidationRequestMessage),

    /// A validator's scored response.
    ValidationResponse(ValidationResponseMessage),

    /// Cast a ballot in an open consensus.
    VoteCast(VoteCastMessage),

    /// Ping for keepalive.
    Ping(u64),

    /// Pong response.
    Pong(u64),

    /// Error message.
    Error(ErrorMessage),
}

impl SyncMessage {
    /// Short tag for log lines and unexpected-reply errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SummaryRequest(_) => "SummaryRequest",
            Self::SummaryResponse(_) => "SummaryResponse",
            Self::VersionRequest(_) => "VersionRequest",
            Self::VersionResponse(_) => "VersionResponse",
            Self::ConflictProposal(_) => "ConflictProposal",
            Self::ValidationRequest(_) => "ValidationRequest",
            Self::ValidationResponse(_) => "ValidationResponse",
            Self::VoteCast(_) => "VoteCast",
            Self::Ping(_) => "Ping",
            Self::Pong(_) => "Pong",
            Self::Error(_) => "Error",
        }
    }
}

/// Request a peer's version summary for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequestMessage {
    /// The collection to summarize.
    pub collection_id: CollectionId,
}

/// Compact description of a peer's replica, enough to detect divergence
/// without shipping data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// The collection described.
    pub collection_id: CollectionId,
    /// Content hash of the peer's current version.
    pub hash: ContentHash,
    /// When that version was authored.
    pub timestamp: HybridTimestamp,
    /// Ancestor hashes, oldest first.
    #[serde(default)]
    pub lineage: Vec<ContentHash>,
    /// Advisory validation outcome on the peer's side.
    pub validation_state: ValidationState,
    /// Community support on the peer's side.
    pub community_support: Score,
}

impl VersionSummary {
    /// Summarizes a full version.
    #[must_use]
    pub fn of(collection_id: CollectionId, version: &CollectionVersion) -> Self {
        Self {
            collection_id,
            hash: version.hash.clone(),
            timestamp: version.timestamp,
            lineage: version.lineage.clone(),
            validation_state: version.cultural_validation.state,
            community_support: version.community_support,
        }
    }
}

/// Reply to a summary request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponseMessage {
    /// The responding peer.
    pub peer_id: PeerId,
    /// The summary, or `None` if the peer no longer holds the collection.
    pub summary: Option<VersionSummary>,
}

/// Request one full version by hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRequestMessage {
    /// The collection the version belongs to.
    pub collection_id: CollectionId,
    /// The exact version wanted.
    pub hash: ContentHash,
}

/// Reply to a version request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponseMessage {
    /// The responding peer.
    pub peer_id: PeerId,
    /// The version, or `None` if it has been pruned.
    pub version: Option<CollectionVersion>,
}

/// Announces a detected conflict so peers can surface it and join any
/// community process it opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictProposalMessage {
    /// The conflict being announced.
    pub conflict_id: ConflictId,
    /// The collection it concerns.
    pub collection_id: CollectionId,
    /// The strategy the announcing peer suggests.
    pub suggested: ResolutionStrategy,
    /// Confidence in the suggestion.
    pub confidence: Score,
}

/// Forwards a cultural-validation request to a validator peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequestMessage {
    /// The request as registered with the workflow.
    pub request: CulturalValidationRequest,
}

/// A validator's scored response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponseMessage {
    /// The request answered.
    pub request_id: RequestId,
    /// The responding validator.
    pub validator: PeerId,
    /// The appropriateness score.
    pub appropriateness: Score,
}

/// Casts a ballot in an open consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteCastMessage {
    /// The consensus voted in.
    pub consensus_id: ConsensusId,
    /// The voting peer.
    pub participant: PeerId,
    /// The chosen option.
    pub option: String,
}

/// Error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorMessage {
    /// Creates a new error message.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Version mismatch error.
    pub fn version_mismatch(expected: u32, got: u32) -> Self {
        Self::new(
            1,
            format!("protocol version mismatch: expected {expected}, got {got}"),
        )
    }

    /// Unknown collection error.
    pub fn unknown_collection(id: &CollectionId) -> Self {
        Self::new(2, format!("unknown collection: {id}"))
    }

    /// Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(99, msg)
    }
}
