//! Conflict records and resolution types.
//!
//! Conflicts and resolutions are tagged unions so that handling is
//! exhaustive: adding a conflict kind or a strategy fails to compile until
//! every classifier and applier accounts for it.

use arkivo_types::{
    CollectionId, CollectionVersion, ConflictId, ContentHash, HybridTimestamp, PeerId, Score,
};
use serde::{Deserialize, Serialize};

/// How bad a conflict is, from routine to community-blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What kind of divergence was detected, with per-kind payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConflictDetail {
    /// Replicas edited independently from a common ancestor.
    Version,
    /// Identical content carries different cultural-validation outcomes.
    CulturalDispute {
        /// The content whose validation is disputed.
        contested: ContentHash,
    },
    /// A peer proposed a version for a collection it does not advertise.
    /// Arrives via inbound conflict proposals, never from local detection.
    Access {
        /// The overreaching peer.
        peer_id: PeerId,
    },
    /// Divergence confined to disjoint metadata fields.
    Metadata {
        /// The union of fields touched across versions.
        fields: Vec<String>,
    },
}

/// A detected divergence between replicas of one collection.
///
/// Created by the coordinator, owned by the resolver until resolved, then
/// discarded — the resolution is recorded, the conflict object is not
/// retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique id for this conflict.
    pub id: ConflictId,
    /// The collection that diverged.
    pub collection_id: CollectionId,
    /// What kind of divergence this is.
    pub detail: ConflictDetail,
    /// Our replica's version.
    pub local_version: CollectionVersion,
    /// The divergent remote versions, one per distinct content hash.
    pub remote_versions: Vec<CollectionVersion>,
    /// Classified severity.
    pub severity: Severity,
    /// Advisory notes on cultural stakes, for ranking and display.
    pub cultural_implications: Vec<String>,
    /// Cultural communities of the peers that authored the divergent
    /// versions, as known to the registry at detection time.
    pub cultural_communities: Vec<String>,
    /// The strategy the resolver suggests.
    pub suggested_resolution: Option<ResolutionStrategy>,
    /// Whether resolution must go through a community process.
    pub requires_community_input: bool,
    /// When the conflict was detected.
    pub timestamp: HybridTimestamp,
}

impl SyncConflict {
    /// All distinct hashes involved, local first.
    #[must_use]
    pub fn involved_hashes(&self) -> Vec<ContentHash> {
        let mut hashes = vec![self.local_version.hash.clone()];
        for remote in &self.remote_versions {
            if !hashes.contains(&remote.hash) {
                hashes.push(remote.hash.clone());
            }
        }
        hashes
    }

    /// The remote version with the given hash, if present.
    #[must_use]
    pub fn remote_by_hash(&self, hash: &ContentHash) -> Option<&CollectionVersion> {
        self.remote_versions.iter().find(|v| &v.hash == hash)
    }
}

/// How a conflict should be resolved, with per-strategy payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Overlay disjoint remote field changes onto the local version.
    Merge {
        /// The remote fields to overlay.
        fields: Vec<String>,
    },
    /// Keep the local version; remotes are rejected.
    ChooseLocal,
    /// Adopt the remote version with this hash.
    ChooseRemote {
        /// The version to adopt.
        hash: ContentHash,
    },
    /// Put the choice to a community vote.
    CommunityVote {
        /// The consensus topic to open.
        topic: String,
    },
    /// Defer to validators from the implicated communities.
    CulturalAuthority {
        /// The communities whose validators decide.
        communities: Vec<String>,
    },
}

impl ResolutionStrategy {
    /// Whether this strategy resolves through a community process rather
    /// than deterministically.
    #[must_use]
    pub fn is_community(&self) -> bool {
        matches!(self, Self::CommunityVote { .. } | Self::CulturalAuthority { .. })
    }
}

/// A computed resolution: the strategy plus everything the presentation
/// layer needs to explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// The chosen strategy.
    pub strategy: ResolutionStrategy,
    /// Confidence in the choice.
    pub confidence: Score,
    /// How the strategy was arrived at.
    pub reasoning: Vec<String>,
    /// Cultural context a reviewer should know.
    pub cultural_considerations: Vec<String>,
    /// What has to happen before the conflict is settled.
    pub required_actions: Vec<String>,
    /// Rough time to settlement.
    pub estimated_time_minutes: u32,
}
