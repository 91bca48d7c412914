//! Advisory cultural-validation workflow.
//!
//! Communities attach context to collection versions through validation
//! requests and scored responses. The output is advisory: scores feed
//! conflict-resolution ranking and presentation-layer display, and nothing
//! here gates, delays, or hides collection content. A request that expires
//! unanswered resolves to `Pending` and the collection stays exactly as
//! retrievable as before.

use crate::config::ValidationConfig;
use crate::error::{ConsensusError, Result};
use arkivo_peer::PeerRegistry;
use arkivo_types::{
    CollectionId, HybridTimestamp, PeerId, RequestId, Score, ValidationState, ValidationStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// What aspect of a version a validation request concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationKind {
    /// Where the material comes from and who may share it.
    Provenance,
    /// Whether naming and credit follow community practice.
    Attribution,
    /// Whether the material is appropriate to circulate as presented.
    Sensitivity,
    /// Whether descriptions and translations are faithful.
    Accuracy,
}

/// Urgency of a validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationPriority {
    Low,
    Normal,
    High,
}

/// A request for community validation of a collection's cultural metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturalValidationRequest {
    /// Unique id for this request.
    pub id: RequestId,
    /// The collection under review.
    pub collection_id: CollectionId,
    /// The community whose context is being sought.
    pub cultural_origin: String,
    /// What aspect the request concerns.
    pub kind: ValidationKind,
    /// The peer asking.
    pub requesting_peer: PeerId,
    /// Validators the request is addressed to; empty means any validator.
    pub target_validators: Vec<PeerId>,
    /// When the request expires.
    pub deadline: HybridTimestamp,
    /// Urgency.
    pub priority: ValidationPriority,
    /// Free-text cultural context supplied by the requester.
    pub cultural_context: String,
    /// Stated educational purpose, if any.
    pub educational_purpose: Option<String>,
}

/// A registered request together with its evolving status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// The request as registered.
    pub request: CulturalValidationRequest,
    /// Scores and advisory outcome so far.
    pub status: ValidationStatus,
    /// Reputation of each validator, snapshotted at submission time.
    pub weights: HashMap<PeerId, Score>,
    /// Whether the deadline sweep has run on this request.
    pub expired: bool,
}

/// Advisory emitted when a request expires without enough responses.
/// Display-only: consumers must not change retrieval behavior on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAdvisory {
    pub request_id: RequestId,
    pub collection_id: CollectionId,
    pub text: String,
}

/// Issues and aggregates advisory validation requests.
pub struct CulturalValidationWorkflow {
    config: ValidationConfig,
    registry: Arc<PeerRegistry>,
    requests: RwLock<HashMap<RequestId, ValidationRecord>>,
}

impl CulturalValidationWorkflow {
    /// Creates a workflow reading validator reputations from the registry.
    pub fn new(registry: Arc<PeerRegistry>, config: ValidationConfig) -> Self {
        Self {
            config,
            registry,
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a validation request.
    pub async fn request_validation(&self, request: CulturalValidationRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(ConsensusError::DuplicateRequest(request.id));
        }
        debug!(
            "Registered validation request {} for collection {} ({:?})",
            request.id, request.collection_id, request.kind
        );
        requests.insert(
            request.id,
            ValidationRecord {
                request,
                status: ValidationStatus::pending(),
                weights: HashMap::new(),
                expired: false,
            },
        );
        Ok(())
    }

    /// Records a validator's appropriateness score and recomputes the
    /// aggregate. Resubmission by the same validator overwrites their
    /// earlier score. The validator's reputation is snapshotted from the
    /// registry as the weight for the weighted mean.
    pub async fn submit_validation(
        &self,
        request_id: RequestId,
        validator: PeerId,
        appropriateness: Score,
    ) -> Result<ValidationStatus> {
        let weight = self
            .registry
            .get(&validator)
            .await
            .map(|peer| peer.reputation)
            .unwrap_or(Score::NEUTRAL);

        let mut requests = self.requests.write().await;
        let record = requests
            .get_mut(&request_id)
            .ok_or(ConsensusError::UnknownRequest(request_id))?;

        if !record.status.scores.contains_key(&validator) {
            record.status.validators.push(validator);
        }
        record.status.scores.insert(validator, appropriateness);
        record.weights.insert(validator, weight);

        record.status = recompute(&record.status, &record.weights, &self.config);
        debug!(
            "Validation {} now has {} scores, consensus {}",
            request_id,
            record.status.scores.len(),
            record.status.community_consensus
        );
        Ok(record.status.clone())
    }

    /// Returns the current status of a request.
    pub async fn status_of(&self, request_id: RequestId) -> Option<ValidationStatus> {
        self.requests
            .read()
            .await
            .get(&request_id)
            .map(|record| record.status.clone())
    }

    /// Returns the full record of a request.
    pub async fn record(&self, request_id: RequestId) -> Option<ValidationRecord> {
        self.requests.read().await.get(&request_id).cloned()
    }

    /// Requests that have not yet passed their deadline sweep, for routing
    /// to validators and for display.
    pub async fn open_requests(&self) -> Vec<CulturalValidationRequest> {
        self.requests
            .read()
            .await
            .values()
            .filter(|record| !record.expired)
            .map(|record| record.request.clone())
            .collect()
    }

    /// Sweeps past-deadline requests. A request that expired without a
    /// single response stays `Pending` and yields a "validation
    /// unavailable" advisory. The underlying collection's retrievability
    /// is not touched, here or anywhere else in the workflow.
    pub async fn expire_due(&self, now: HybridTimestamp) -> Vec<ValidationAdvisory> {
        let mut advisories = Vec::new();
        let mut requests = self.requests.write().await;
        for record in requests.values_mut() {
            if record.expired || record.request.deadline >= now {
                continue;
            }
            record.expired = true;
            if record.status.scores.is_empty() {
                let advisory = ValidationAdvisory {
                    request_id: record.request.id,
                    collection_id: record.request.collection_id,
                    text: format!(
                        "cultural validation for collection {} expired with no validator \
                         responses; status remains pending and is advisory only",
                        record.request.collection_id
                    ),
                };
                warn!("{}", advisory.text);
                advisories.push(advisory);
            }
        }
        advisories
    }
}

/// Recomputes aggregate scores from the submitted per-validator scores.
fn recompute(
    status: &ValidationStatus,
    weights: &HashMap<PeerId, Score>,
    config: &ValidationConfig,
) -> ValidationStatus {
    let mut next = status.clone();
    next.timestamp = HybridTimestamp::now();

    if next.scores.is_empty() {
        return next;
    }

    let values: Vec<f64> = next.scores.values().map(Score::value).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    next.cultural_appropriateness = Score::new(mean);

    let weight_sum: f64 = next
        .scores
        .keys()
        .map(|peer| weights.get(peer).copied().unwrap_or(Score::NEUTRAL).value())
        .sum();
    let weighted = if weight_sum > 0.0 {
        next.scores
            .iter()
            .map(|(peer, score)| {
                weights.get(peer).copied().unwrap_or(Score::NEUTRAL).value() * score.value()
            })
            .sum::<f64>()
            / weight_sum
    } else {
        mean
    };
    next.community_consensus = Score::new(weighted);

    let spread = values.iter().cloned().fold(f64::MIN, f64::max)
        - values.iter().cloned().fold(f64::MAX, f64::min);
    next.state = if spread > config.dispute_spread {
        ValidationState::Disputed
    } else if weighted >= config.approve_threshold {
        ValidationState::Approved
    } else if weighted <= config.reject_threshold {
        ValidationState::Rejected
    } else {
        ValidationState::Pending
    };

    next
}
