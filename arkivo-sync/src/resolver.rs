//! Conflict classification and resolution.
//!
//! Classification and strategy selection are pure and synchronous; only
//! application touches the store, the registry, and the community
//! processes. A conflict the community has not yet decided is never
//! dropped: it stays pending and is retried on the next scheduled sync.

use crate::config::{ResolverConfig, SyncSettings};
use crate::conflict::{
    ConflictDetail, ConflictResolution, ResolutionStrategy, Severity, SyncConflict,
};
use crate::error::{SyncError, SyncResult};
use crate::store::CollectionStore;
use arkivo_consensus::{
    CommunityConsensus, ConsensusEngine, ConsensusResult, CulturalValidationRequest,
    CulturalValidationWorkflow, ValidationAdvisory, ValidationKind, ValidationPriority,
};
use arkivo_peer::{PeerFilter, PeerRegistry};
use arkivo_types::{
    CollectionId, CollectionVersion, ConflictId, ConsensusId, ContentHash, HybridTimestamp,
    PeerId, RequestId, Score, ValidationState,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Prefix for vote options that adopt a remote version.
const ADOPT_PREFIX: &str = "adopt:";
/// Vote option that keeps the local version.
const KEEP_LOCAL: &str = "keep-local";

/// Result of applying a resolution.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// The winning version is now the local replica.
    Applied(CollectionVersion),
    /// The strategy needs a community process first; nothing was written.
    Deferred,
}

/// Result of driving a pending conflict through resolution.
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// The conflict is settled and discarded.
    Applied {
        version: CollectionVersion,
        resolution: ConflictResolution,
    },
    /// The conflict stays pending on a community decision.
    Deferred { resolution: ConflictResolution },
}

#[derive(Debug, Clone, Copy)]
enum Escalation {
    Vote(ConsensusId),
    Validation(RequestId),
}

struct PendingConflict {
    conflict: SyncConflict,
    escalation: Option<Escalation>,
}

/// Classifies conflicts, proposes resolutions, and applies or defers them.
pub struct ConflictResolver {
    config: ResolverConfig,
    resolution_timeout: Duration,
    store: Arc<dyn CollectionStore>,
    registry: Arc<PeerRegistry>,
    consensus: Arc<ConsensusEngine>,
    validation: Arc<CulturalValidationWorkflow>,
    pending: RwLock<HashMap<ConflictId, PendingConflict>>,
    audit: RwLock<HashMap<ConflictId, Vec<CollectionVersion>>>,
    resolved: AtomicUsize,
}

impl ConflictResolver {
    /// Creates a resolver wired to its collaborators.
    pub fn new(
        store: Arc<dyn CollectionStore>,
        registry: Arc<PeerRegistry>,
        consensus: Arc<ConsensusEngine>,
        validation: Arc<CulturalValidationWorkflow>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            config: settings.resolver.clone(),
            resolution_timeout: settings.conflict_resolution_timeout,
            store,
            registry,
            consensus,
            validation,
            pending: RwLock::new(HashMap::new()),
            audit: RwLock::new(HashMap::new()),
            resolved: AtomicUsize::new(0),
        }
    }

    /// The classification thresholds in use.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    // ── Classification ───────────────────────────────────────────

    /// Derives severity from divergence count, cultural implications, and
    /// the reputation spread among remote authors.
    pub fn classify(&self, conflict: &SyncConflict) -> Severity {
        if conflict.remote_versions.len() >= self.config.critical_divergence {
            return Severity::Critical;
        }

        if !conflict.cultural_implications.is_empty() {
            let contested = std::iter::once(&conflict.local_version)
                .chain(conflict.remote_versions.iter())
                .any(|v| v.community_support.value() < self.config.contested_support);
            return if contested { Severity::Critical } else { Severity::High };
        }

        if matches!(conflict.detail, ConflictDetail::Access { .. }) {
            return Severity::High;
        }

        // A wide reputation spread means a trusted and an untrusted author
        // disagree, which deterministic rules should not settle quietly.
        if reputation_spread(&conflict.remote_versions) > self.config.reputation_spread {
            return Severity::High;
        }

        if conflict.remote_versions.len() >= 2 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Proposes a resolution. Deterministic strategies are tried first;
    /// high and critical conflicts always go to a community process, as
    /// does anything the deterministic rules cannot settle.
    pub fn propose_resolution(&self, conflict: &SyncConflict) -> ConflictResolution {
        if conflict.severity < Severity::High {
            if let Some(resolution) = self.timestamp_preference(conflict) {
                return resolution;
            }
            if let Some(resolution) = self.disjoint_merge(conflict) {
                return resolution;
            }
        }
        self.community_resolution(conflict)
    }

    fn timestamp_preference(&self, conflict: &SyncConflict) -> Option<ConflictResolution> {
        let local = &conflict.local_version;
        let local_consensus = local.cultural_validation.community_consensus.value();

        let newer: Vec<&CollectionVersion> = conflict
            .remote_versions
            .iter()
            .filter(|remote| remote.timestamp > local.timestamp)
            .collect();

        if newer.len() == 1 {
            let candidate = newer[0];
            let margin =
                candidate.cultural_validation.community_consensus.value() - local_consensus;
            if margin >= 0.0 {
                return Some(ConflictResolution {
                    strategy: ResolutionStrategy::ChooseRemote {
                        hash: candidate.hash.clone(),
                    },
                    confidence: Score::new(0.5 + margin / 2.0),
                    reasoning: vec![format!(
                        "remote {} is strictly newer and its community consensus ({}) is not \
                         below ours ({:.3})",
                        candidate.hash.short(),
                        candidate.cultural_validation.community_consensus,
                        local_consensus
                    )],
                    cultural_considerations: conflict.cultural_implications.clone(),
                    required_actions: Vec::new(),
                    estimated_time_minutes: 1,
                });
            }
            return None;
        }

        if newer.is_empty()
            && conflict
                .remote_versions
                .iter()
                .all(|remote| remote.timestamp < local.timestamp)
        {
            let best_remote = conflict
                .remote_versions
                .iter()
                .map(|r| r.cultural_validation.community_consensus.value())
                .fold(0.0, f64::max);
            let margin = local_consensus - best_remote;
            if margin >= 0.0 {
                return Some(ConflictResolution {
                    strategy: ResolutionStrategy::ChooseLocal,
                    confidence: Score::new(0.5 + margin / 2.0),
                    reasoning: vec![
                        "the local version is strictly newer than every remote and at least \
                         as endorsed"
                            .into(),
                    ],
                    cultural_considerations: conflict.cultural_implications.clone(),
                    required_actions: Vec::new(),
                    estimated_time_minutes: 1,
                });
            }
        }
        None
    }

    fn disjoint_merge(&self, conflict: &SyncConflict) -> Option<ConflictResolution> {
        if !matches!(
            conflict.detail,
            ConflictDetail::Version | ConflictDetail::Metadata { .. }
        ) {
            return None;
        }

        let mut seen: BTreeSet<String> = conflict.local_version.changed_fields.clone();
        let mut merged_fields = Vec::new();
        for remote in &conflict.remote_versions {
            if remote.changed_fields.is_empty() {
                return None;
            }
            for field in &remote.changed_fields {
                if !seen.insert(field.clone()) {
                    return None;
                }
                merged_fields.push(field.clone());
            }
        }
        if merged_fields.is_empty() {
            return None;
        }

        Some(ConflictResolution {
            strategy: ResolutionStrategy::Merge {
                fields: merged_fields,
            },
            confidence: Score::new(0.75),
            reasoning: vec![
                "all divergent versions changed disjoint metadata fields; the edits compose"
                    .into(),
            ],
            cultural_considerations: conflict.cultural_implications.clone(),
            required_actions: Vec::new(),
            estimated_time_minutes: 1,
        })
    }

    fn community_resolution(&self, conflict: &SyncConflict) -> ConflictResolution {
        let cultural = !conflict.cultural_implications.is_empty()
            || matches!(conflict.detail, ConflictDetail::CulturalDispute { .. });

        if cultural && !conflict.cultural_communities.is_empty() {
            ConflictResolution {
                strategy: ResolutionStrategy::CulturalAuthority {
                    communities: conflict.cultural_communities.clone(),
                },
                confidence: Score::new(0.25),
                reasoning: vec![
                    "cultural implications put this outside automatic resolution".into(),
                ],
                cultural_considerations: conflict.cultural_implications.clone(),
                required_actions: vec![
                    "gather validator scores from the implicated communities".into(),
                    "re-run resolution once validation settles".into(),
                ],
                estimated_time_minutes: 240,
            }
        } else {
            ConflictResolution {
                strategy: ResolutionStrategy::CommunityVote {
                    topic: format!("conflict-resolution:{}", conflict.id),
                },
                confidence: Score::new(0.25),
                reasoning: vec![
                    "no deterministic rule settles this divergence confidently".into(),
                ],
                cultural_considerations: conflict.cultural_implications.clone(),
                required_actions: vec![
                    "collect community ballots".into(),
                    "apply the winning option after closure".into(),
                ],
                estimated_time_minutes: 60,
            }
        }
    }

    // ── Pending-conflict bookkeeping ─────────────────────────────

    /// Takes ownership of a freshly detected conflict.
    pub async fn admit(&self, conflict: SyncConflict) {
        debug!(
            "Admitted conflict {} for collection {} ({:?}, {:?})",
            conflict.id, conflict.collection_id, conflict.detail, conflict.severity
        );
        self.pending.write().await.insert(
            conflict.id,
            PendingConflict {
                conflict,
                escalation: None,
            },
        );
    }

    /// Snapshots of all pending conflicts, for display and manual retry.
    pub async fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.pending
            .read()
            .await
            .values()
            .map(|p| p.conflict.clone())
            .collect()
    }

    /// Number of pending conflicts.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Whether a collection has unresolved conflicts.
    pub async fn has_pending(&self, collection_id: &CollectionId) -> bool {
        self.pending
            .read()
            .await
            .values()
            .any(|p| p.conflict.collection_id == *collection_id)
    }

    /// Versions rejected by community-reviewed resolutions, kept
    /// queryable for audit. Deterministic resolutions prune immediately
    /// and leave nothing here.
    pub async fn audit_versions(&self, conflict_id: &ConflictId) -> Vec<CollectionVersion> {
        self.audit
            .read()
            .await
            .get(conflict_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Conflicts settled since startup.
    pub fn resolved_count(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }

    // ── Resolution driving ───────────────────────────────────────

    /// Drives a pending conflict: proposes, then applies deterministic
    /// strategies directly or escalates community strategies. An escalated
    /// conflict that cannot reach a decision within the resolution timeout
    /// stays pending and is retried later, never dropped.
    pub async fn resolve(&self, conflict_id: ConflictId) -> SyncResult<ResolutionOutcome> {
        let (conflict, escalation) = self.pending_entry(conflict_id).await?;
        if let Some(escalation) = escalation {
            return self.check_escalation(&conflict, escalation).await;
        }

        let resolution = self.propose_resolution(&conflict);
        match resolution.strategy.clone() {
            ResolutionStrategy::CommunityVote { topic } => {
                let options = vote_options(&conflict);
                let consensus_id = self.consensus.initiate(topic, options, None).await?;
                self.set_escalation(conflict_id, Escalation::Vote(consensus_id)).await;
                info!(
                    "Escalated conflict {} to community vote {}",
                    conflict_id, consensus_id
                );
                match timeout(self.resolution_timeout, self.await_consensus(consensus_id)).await
                {
                    Ok(record) => self.settle_vote(&conflict, record, resolution).await,
                    Err(_) => {
                        warn!(
                            "Community vote for conflict {} did not close in time; conflict \
                             stays pending",
                            conflict_id
                        );
                        Ok(ResolutionOutcome::Deferred { resolution })
                    }
                }
            }
            ResolutionStrategy::CulturalAuthority { communities } => {
                let request = self.authority_request(&conflict, &communities).await;
                let request_id = request.id;
                self.validation.request_validation(request).await?;
                self.set_escalation(conflict_id, Escalation::Validation(request_id)).await;
                info!(
                    "Escalated conflict {} to cultural validation {}",
                    conflict_id, request_id
                );
                Ok(ResolutionOutcome::Deferred { resolution })
            }
            _ => {
                let version = self.apply_concrete(&conflict, &resolution).await?;
                self.finish(&conflict, &version.hash).await;
                Ok(ResolutionOutcome::Applied {
                    version,
                    resolution,
                })
            }
        }
    }

    /// Applies an operator-chosen concrete strategy to a pending conflict.
    pub async fn resolve_with(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
    ) -> SyncResult<ResolutionOutcome> {
        if strategy.is_community() {
            return Err(SyncError::ApplyFailed(
                "community strategies are escalated through resolve(), not applied directly"
                    .into(),
            ));
        }
        let (conflict, _) = self.pending_entry(conflict_id).await?;
        let resolution = ConflictResolution {
            strategy,
            confidence: Score::MAX,
            reasoning: vec!["resolved manually by operator".into()],
            cultural_considerations: conflict.cultural_implications.clone(),
            required_actions: Vec::new(),
            estimated_time_minutes: 0,
        };
        let version = self.apply_concrete(&conflict, &resolution).await?;
        self.finish(&conflict, &version.hash).await;
        Ok(ResolutionOutcome::Applied {
            version,
            resolution,
        })
    }

    /// Applies a resolution: concrete strategies write the winning version
    /// and feed reputation back; community strategies defer.
    pub async fn apply(
        &self,
        conflict: &SyncConflict,
        resolution: &ConflictResolution,
    ) -> SyncResult<ApplyOutcome> {
        if resolution.strategy.is_community() {
            return Ok(ApplyOutcome::Deferred);
        }
        let version = self.apply_concrete(conflict, resolution).await?;
        if self.pending.read().await.contains_key(&conflict.id) {
            self.finish(conflict, &version.hash).await;
        }
        Ok(ApplyOutcome::Applied(version))
    }

    /// Closes overdue consensus topics and expires overdue validation
    /// requests, so deadline-triggered closure fires even when nobody is
    /// actively driving a conflict. Returns the advisories the validation
    /// sweep emitted, for display.
    pub async fn sweep_deadlines(&self) -> Vec<ValidationAdvisory> {
        let now = HybridTimestamp::now();
        let closed = self.consensus.expire_due(now).await;
        if !closed.is_empty() {
            debug!("Deadline sweep closed {} consensus topics", closed.len());
        }
        self.validation.expire_due(now).await
    }

    /// Re-drives every pending conflict, picking up community decisions
    /// that landed since the last pass.
    pub async fn retry_pending(&self) -> Vec<(ConflictId, ResolutionOutcome)> {
        let ids: Vec<ConflictId> = self.pending.read().await.keys().copied().collect();
        let mut outcomes = Vec::new();
        for id in ids {
            match self.resolve(id).await {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(e) => warn!("Retrying conflict {} failed: {}", id, e),
            }
        }
        outcomes
    }

    // ── Escalation plumbing ──────────────────────────────────────

    async fn check_escalation(
        &self,
        conflict: &SyncConflict,
        escalation: Escalation,
    ) -> SyncResult<ResolutionOutcome> {
        let proposed = self.propose_resolution(conflict);
        match escalation {
            Escalation::Vote(consensus_id) => {
                match self.consensus.get(consensus_id).await {
                    Some(record) if record.closed.is_some() => {
                        self.settle_vote(conflict, record, proposed).await
                    }
                    Some(_) => Ok(ResolutionOutcome::Deferred {
                        resolution: proposed,
                    }),
                    None => {
                        self.clear_escalation(conflict.id).await;
                        Ok(ResolutionOutcome::Deferred {
                            resolution: proposed,
                        })
                    }
                }
            }
            Escalation::Validation(request_id) => {
                let Some(status) = self.validation.status_of(request_id).await else {
                    self.clear_escalation(conflict.id).await;
                    return Ok(ResolutionOutcome::Deferred {
                        resolution: proposed,
                    });
                };
                match status.state {
                    ValidationState::Approved => {
                        let Some(contested) = contested_remote(conflict) else {
                            return Ok(ResolutionOutcome::Deferred {
                                resolution: proposed,
                            });
                        };
                        let resolution = ConflictResolution {
                            strategy: ResolutionStrategy::ChooseRemote {
                                hash: contested.hash.clone(),
                            },
                            confidence: status.community_consensus,
                            reasoning: vec![
                                "community validators affirmed the contested version".into(),
                            ],
                            cultural_considerations: proposed.cultural_considerations,
                            required_actions: Vec::new(),
                            estimated_time_minutes: 0,
                        };
                        let version = self.apply_concrete(conflict, &resolution).await?;
                        self.finish(conflict, &version.hash).await;
                        Ok(ResolutionOutcome::Applied {
                            version,
                            resolution,
                        })
                    }
                    ValidationState::Rejected => {
                        let resolution = ConflictResolution {
                            strategy: ResolutionStrategy::ChooseLocal,
                            confidence: Score::new(1.0 - status.community_consensus.value()),
                            reasoning: vec![
                                "community validators rejected the contested version".into(),
                            ],
                            cultural_considerations: proposed.cultural_considerations,
                            required_actions: Vec::new(),
                            estimated_time_minutes: 0,
                        };
                        let version = self.apply_concrete(conflict, &resolution).await?;
                        self.finish(conflict, &version.hash).await;
                        Ok(ResolutionOutcome::Applied {
                            version,
                            resolution,
                        })
                    }
                    ValidationState::Pending | ValidationState::Disputed => {
                        Ok(ResolutionOutcome::Deferred {
                            resolution: proposed,
                        })
                    }
                }
            }
        }
    }

    async fn settle_vote(
        &self,
        conflict: &SyncConflict,
        record: CommunityConsensus,
        proposed: ConflictResolution,
    ) -> SyncResult<ResolutionOutcome> {
        let Some(closed) = record.closed.clone() else {
            return Ok(ResolutionOutcome::Deferred {
                resolution: proposed,
            });
        };

        if closed.result != ConsensusResult::Approved {
            // Rejected, Modified, and Pending all mean the community did
            // not settle on a side; clear the escalation so a later retry
            // can reopen the question.
            self.clear_escalation(conflict.id).await;
            let mut resolution = proposed;
            resolution
                .reasoning
                .push(format!("community vote closed {:?} without a decision", closed.result));
            return Ok(ResolutionOutcome::Deferred { resolution });
        }

        let mut leading: Option<(&String, usize)> = None;
        for option in &record.options {
            let count = closed.votes.get(option).copied().unwrap_or(0);
            if leading.map(|(_, best)| count > best).unwrap_or(true) {
                leading = Some((option, count));
            }
        }
        let Some((option, _)) = leading else {
            return Ok(ResolutionOutcome::Deferred {
                resolution: proposed,
            });
        };

        let strategy = if option.as_str() == KEEP_LOCAL {
            ResolutionStrategy::ChooseLocal
        } else if let Some(digest) = option.strip_prefix(ADOPT_PREFIX) {
            ResolutionStrategy::ChooseRemote {
                hash: ContentHash::from_hex(digest),
            }
        } else {
            return Err(SyncError::ApplyFailed(format!(
                "vote closed on unrecognized option '{option}'"
            )));
        };

        let resolution = ConflictResolution {
            strategy,
            confidence: closed.confidence,
            reasoning: closed.reasoning.clone(),
            cultural_considerations: proposed.cultural_considerations,
            required_actions: Vec::new(),
            estimated_time_minutes: 0,
        };
        let version = self.apply_concrete(conflict, &resolution).await?;
        self.finish(conflict, &version.hash).await;
        Ok(ResolutionOutcome::Applied {
            version,
            resolution,
        })
    }

    async fn await_consensus(&self, consensus_id: ConsensusId) -> CommunityConsensus {
        loop {
            if let Some(record) = self.consensus.get(consensus_id).await {
                if record.closed.is_some() {
                    return record;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    async fn authority_request(
        &self,
        conflict: &SyncConflict,
        communities: &[String],
    ) -> CulturalValidationRequest {
        let mut target_validators: Vec<PeerId> = Vec::new();
        for validator in self.registry.list_peers(PeerFilter::Validators).await {
            if communities
                .iter()
                .any(|c| validator.cultural_communities.contains(c))
            {
                target_validators.push(validator.id);
            }
        }

        CulturalValidationRequest {
            id: RequestId::new(),
            collection_id: conflict.collection_id,
            cultural_origin: communities.first().cloned().unwrap_or_default(),
            kind: ValidationKind::Sensitivity,
            requesting_peer: self.registry.local_peer(),
            target_validators,
            deadline: HybridTimestamp::now().plus(self.resolution_timeout),
            priority: ValidationPriority::High,
            cultural_context: conflict.cultural_implications.join("; "),
            educational_purpose: None,
        }
    }

    // ── Application ──────────────────────────────────────────────

    async fn apply_concrete(
        &self,
        conflict: &SyncConflict,
        resolution: &ConflictResolution,
    ) -> SyncResult<CollectionVersion> {
        let winner = match &resolution.strategy {
            ResolutionStrategy::ChooseLocal => conflict.local_version.clone(),
            ResolutionStrategy::ChooseRemote { hash } => conflict
                .remote_by_hash(hash)
                .cloned()
                .ok_or_else(|| {
                    SyncError::ApplyFailed(format!(
                        "chosen version {} is no longer among the conflict's remotes",
                        hash.short()
                    ))
                })?,
            ResolutionStrategy::Merge { fields } => {
                self.merge_versions(conflict, fields)?
            }
            ResolutionStrategy::CommunityVote { .. }
            | ResolutionStrategy::CulturalAuthority { .. } => {
                return Err(SyncError::ApplyFailed(
                    "community strategies have no direct application".into(),
                ));
            }
        };

        // ChooseLocal leaves the replica as-is; everything else writes.
        if !matches!(resolution.strategy, ResolutionStrategy::ChooseLocal) {
            self.store
                .save_collection(&conflict.collection_id, winner.clone())
                .map_err(|e| SyncError::ApplyFailed(e.to_string()))?;
        }

        self.feed_reputation(conflict, &winner, &resolution.strategy).await;
        info!(
            "Applied {} to conflict {}: collection {} now at {}",
            strategy_name(&resolution.strategy),
            conflict.id,
            conflict.collection_id,
            winner.hash.short()
        );
        Ok(winner)
    }

    fn merge_versions(
        &self,
        conflict: &SyncConflict,
        fields: &[String],
    ) -> SyncResult<CollectionVersion> {
        let mut data = conflict.local_version.data.clone();
        let object = data.as_object_mut().ok_or_else(|| {
            SyncError::ApplyFailed("local version data is not a JSON object".into())
        })?;

        for remote in &conflict.remote_versions {
            let remote_object = remote.data.as_object().ok_or_else(|| {
                SyncError::ApplyFailed(format!(
                    "remote version {} data is not a JSON object",
                    remote.hash.short()
                ))
            })?;
            for field in &remote.changed_fields {
                match remote_object.get(field) {
                    Some(value) => {
                        object.insert(field.clone(), value.clone());
                    }
                    None => {
                        object.remove(field);
                    }
                }
            }
        }

        let mut merged = conflict.local_version.child(
            self.registry.local_peer(),
            data,
            fields.iter().cloned(),
        );
        for remote in &conflict.remote_versions {
            for hash in remote.lineage.iter().chain(std::iter::once(&remote.hash)) {
                if !merged.lineage.contains(hash) {
                    merged.lineage.push(hash.clone());
                }
            }
            merged.timestamp = merged.timestamp.observe(&remote.timestamp);
        }
        Ok(merged)
    }

    /// Small positive delta to the accepted version's author, small
    /// negative to authors of rejected versions. Unknown authors (usually
    /// ourselves) are skipped.
    async fn feed_reputation(
        &self,
        conflict: &SyncConflict,
        winner: &CollectionVersion,
        strategy: &ResolutionStrategy,
    ) {
        let merged = matches!(strategy, ResolutionStrategy::Merge { .. });

        let mut accepted: BTreeSet<PeerId> = BTreeSet::new();
        let mut rejected: BTreeSet<PeerId> = BTreeSet::new();

        if merged {
            // Every contributor's edit survived.
            accepted.insert(conflict.local_version.peer_id);
            for remote in &conflict.remote_versions {
                accepted.insert(remote.peer_id);
            }
        } else {
            accepted.insert(winner.peer_id);
            for version in std::iter::once(&conflict.local_version)
                .chain(conflict.remote_versions.iter())
            {
                if version.hash != winner.hash {
                    rejected.insert(version.peer_id);
                }
            }
        }

        for peer in &accepted {
            let _ = self.registry.update_reputation(peer, self.config.accept_delta).await;
        }
        for peer in rejected.difference(&accepted) {
            let _ = self.registry.update_reputation(peer, self.config.reject_delta).await;
        }
    }

    async fn finish(&self, conflict: &SyncConflict, winner_hash: &ContentHash) {
        self.pending.write().await.remove(&conflict.id);
        if conflict.requires_community_input {
            let rejected: Vec<CollectionVersion> =
                std::iter::once(&conflict.local_version)
                    .chain(conflict.remote_versions.iter())
                    .filter(|v| v.hash != *winner_hash)
                    .cloned()
                    .collect();
            self.audit.write().await.insert(conflict.id, rejected);
        }
        self.resolved.fetch_add(1, Ordering::Relaxed);
        info!(
            "Conflict {} for collection {} is settled",
            conflict.id, conflict.collection_id
        );
    }

    async fn pending_entry(
        &self,
        conflict_id: ConflictId,
    ) -> SyncResult<(SyncConflict, Option<Escalation>)> {
        let pending = self.pending.read().await;
        let entry = pending
            .get(&conflict_id)
            .ok_or(SyncError::UnknownConflict(conflict_id))?;
        Ok((entry.conflict.clone(), entry.escalation))
    }

    async fn set_escalation(&self, conflict_id: ConflictId, escalation: Escalation) {
        if let Some(entry) = self.pending.write().await.get_mut(&conflict_id) {
            entry.escalation = Some(escalation);
        }
    }

    async fn clear_escalation(&self, conflict_id: ConflictId) {
        if let Some(entry) = self.pending.write().await.get_mut(&conflict_id) {
            entry.escalation = None;
        }
    }
}

/// Ballot options for a conflict vote: keep local, or adopt one of the
/// divergent remotes.
fn vote_options(conflict: &SyncConflict) -> Vec<String> {
    let mut options = vec![KEEP_LOCAL.to_string()];
    for remote in &conflict.remote_versions {
        options.push(format!("{ADOPT_PREFIX}{}", remote.hash));
    }
    options
}

/// The remote a cultural-authority decision speaks to.
fn contested_remote(conflict: &SyncConflict) -> Option<&CollectionVersion> {
    if let ConflictDetail::CulturalDispute { contested } = &conflict.detail {
        return conflict.remote_by_hash(contested);
    }
    if conflict.remote_versions.len() == 1 {
        return conflict.remote_versions.first();
    }
    conflict
        .remote_versions
        .iter()
        .min_by(|a, b| {
            a.community_support
                .value()
                .partial_cmp(&b.community_support.value())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn reputation_spread(versions: &[CollectionVersion]) -> f64 {
    if versions.len() < 2 {
        return 0.0;
    }
    let max = versions
        .iter()
        .map(|v| v.peer_reputation.value())
        .fold(0.0, f64::max);
    let min = versions
        .iter()
        .map(|v| v.peer_reputation.value())
        .fold(1.0, f64::min);
    max - min
}

fn strategy_name(strategy: &ResolutionStrategy) -> &'static str {
    match strategy {
        ResolutionStrategy::Merge { .. } => "Merge",
        ResolutionStrategy::ChooseLocal => "ChooseLocal",
        ResolutionStrategy::ChooseRemote { .. } => "ChooseRemote",
        ResolutionStrategy::CommunityVote { .. } => "CommunityVote",
        ResolutionStrategy::CulturalAuthority { .. } => "CulturalAuthority",
    }
}
