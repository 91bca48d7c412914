//! Collection versions — the immutable unit of replication.
//!
//! Every replica of a collection is described by a `CollectionVersion`.
//! Versions are never mutated after creation; an edit produces a child
//! version whose `lineage` records its ancestors, which is how the sync
//! layer tells a fast-forward from genuine divergence.

use crate::{ContentHash, HybridTimestamp, PeerId, Score};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Advisory validation outcome for a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationState {
    /// No decision yet, or the validation window expired without responses.
    Pending,
    /// The community considers the version culturally appropriate.
    Approved,
    /// The community considers the version culturally inappropriate.
    Rejected,
    /// Validators disagree strongly.
    Disputed,
}

/// Advisory cultural-validation status attached to a version.
///
/// Never authoritative over access — it only ranks versions during
/// conflict resolution and feeds presentation-layer display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatus {
    /// Current advisory outcome.
    pub state: ValidationState,
    /// Validators that have submitted a score.
    pub validators: Vec<PeerId>,
    /// Per-validator appropriateness scores.
    pub scores: HashMap<PeerId, Score>,
    /// Plain mean of submitted appropriateness scores.
    pub cultural_appropriateness: Score,
    /// Reputation-weighted mean of submitted appropriateness scores.
    pub community_consensus: Score,
    /// When the status was last recomputed.
    pub timestamp: HybridTimestamp,
}

impl ValidationStatus {
    /// A fresh status with no submissions.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: ValidationState::Pending,
            validators: Vec::new(),
            scores: HashMap::new(),
            cultural_appropriateness: Score::NEUTRAL,
            community_consensus: Score::MIN,
            timestamp: HybridTimestamp::now(),
        }
    }

    /// A status with a fixed state and consensus, for versions received
    /// from peers that only ship a digest.
    #[must_use]
    pub fn with_outcome(state: ValidationState, community_consensus: Score) -> Self {
        Self {
            state,
            community_consensus,
            ..Self::pending()
        }
    }
}

impl Default for ValidationStatus {
    fn default() -> Self {
        Self::pending()
    }
}

/// One immutable version of a collection replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionVersion {
    /// Content hash of `data`. Equal data implies an equal hash.
    pub hash: ContentHash,
    /// The peer that authored this version.
    pub peer_id: PeerId,
    /// Collection metadata as a JSON document.
    pub data: serde_json::Value,
    /// When the version was authored.
    pub timestamp: HybridTimestamp,
    /// Advisory cultural-validation status.
    pub cultural_validation: ValidationStatus,
    /// Community support for this version.
    pub community_support: Score,
    /// Reputation of the authoring peer at creation time.
    pub peer_reputation: Score,
    /// Hashes of ancestor versions, oldest first.
    #[serde(default)]
    pub lineage: Vec<ContentHash>,
    /// Top-level metadata fields this version changed relative to its parent.
    #[serde(default)]
    pub changed_fields: BTreeSet<String>,
}

impl CollectionVersion {
    /// Creates a root version with no ancestors. The hash is computed from
    /// `data`, never supplied by the caller.
    #[must_use]
    pub fn new(peer_id: PeerId, data: serde_json::Value, timestamp: HybridTimestamp) -> Self {
        Self {
            hash: ContentHash::of_value(&data),
            peer_id,
            data,
            timestamp,
            cultural_validation: ValidationStatus::pending(),
            community_support: Score::NEUTRAL,
            peer_reputation: Score::NEUTRAL,
            lineage: Vec::new(),
            changed_fields: BTreeSet::new(),
        }
    }

    /// Creates a child of this version with new data. The parent's hash is
    /// appended to the child's lineage.
    #[must_use]
    pub fn child(
        &self,
        peer_id: PeerId,
        data: serde_json::Value,
        changed_fields: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut lineage = self.lineage.clone();
        lineage.push(self.hash.clone());
        Self {
            hash: ContentHash::of_value(&data),
            peer_id,
            data,
            timestamp: self.timestamp.tick(),
            cultural_validation: ValidationStatus::pending(),
            community_support: Score::NEUTRAL,
            peer_reputation: Score::NEUTRAL,
            lineage,
            changed_fields: changed_fields.into_iter().collect(),
        }
    }

    /// Sets the validation status.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationStatus) -> Self {
        self.cultural_validation = validation;
        self
    }

    /// Sets the community support score.
    #[must_use]
    pub fn with_support(mut self, support: Score) -> Self {
        self.community_support = support;
        self
    }

    /// Sets the authoring peer's reputation snapshot.
    #[must_use]
    pub fn with_reputation(mut self, reputation: Score) -> Self {
        self.peer_reputation = reputation;
        self
    }

    /// True if this version is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.lineage.contains(&self.hash)
    }

    /// True if this version is a strict descendant of `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        other.is_ancestor_of(self)
    }

    /// True if the two versions edited independently: different content and
    /// neither is an ancestor of the other.
    #[must_use]
    pub fn diverged_from(&self, other: &Self) -> bool {
        self.hash != other.hash && !self.is_ancestor_of(other) && !other.is_ancestor_of(self)
    }
}
