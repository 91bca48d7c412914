use arkivo_consensus::{
    ConsensusConfig, ConsensusEngine, CulturalValidationWorkflow, ValidationConfig,
};
use arkivo_peer::transport::mock::MockTransport;
use arkivo_peer::{Peer, PeerConfig, PeerRegistry};
use arkivo_sync::store::memory::MemoryCollectionStore;
use arkivo_sync::{
    ConflictDetail, ConflictResolver, ResolutionOutcome, ResolutionStrategy, Severity,
    SyncConflict, SyncError, SyncSettings,
};
use arkivo_types::{
    CollectionId, CollectionVersion, ConflictId, HybridTimestamp, PeerId, Score,
    ValidationState, ValidationStatus,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    registry: Arc<PeerRegistry>,
    store: Arc<MemoryCollectionStore>,
    consensus: Arc<ConsensusEngine>,
    validation: Arc<CulturalValidationWorkflow>,
    resolver: Arc<ConflictResolver>,
}

fn make_fixture() -> Fixture {
    make_fixture_with(
        SyncSettings::default(),
        ConsensusConfig::default(),
    )
}

fn make_fixture_with(settings: SyncSettings, consensus_config: ConsensusConfig) -> Fixture {
    let registry = Arc::new(PeerRegistry::new(
        Arc::new(MockTransport::new()),
        PeerConfig::default(),
    ));
    let store = Arc::new(MemoryCollectionStore::new());
    let consensus = Arc::new(ConsensusEngine::new(consensus_config));
    let validation = Arc::new(CulturalValidationWorkflow::new(
        registry.clone(),
        ValidationConfig::default(),
    ));
    let resolver = Arc::new(ConflictResolver::new(
        store.clone(),
        registry.clone(),
        consensus.clone(),
        validation.clone(),
        &settings,
    ));
    Fixture {
        registry,
        store,
        consensus,
        validation,
        resolver,
    }
}

fn version_at(author: PeerId, data: serde_json::Value, wall: u64) -> CollectionVersion {
    CollectionVersion::new(author, data, HybridTimestamp::new(wall, 0))
}

fn make_conflict(
    local: CollectionVersion,
    remotes: Vec<CollectionVersion>,
    implications: Vec<String>,
) -> SyncConflict {
    SyncConflict {
        id: ConflictId::new(),
        collection_id: CollectionId::new(),
        detail: ConflictDetail::Version,
        local_version: local,
        remote_versions: remotes,
        severity: Severity::Low,
        cultural_implications: implications,
        cultural_communities: Vec::new(),
        suggested_resolution: None,
        requires_community_input: false,
        timestamp: HybridTimestamp::now(),
    }
}

// ── Classification ───────────────────────────────────────────────

#[test]
fn three_divergent_versions_is_critical() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remotes = (1..=3)
        .map(|i| version_at(PeerId::new(), json!({"v": i}), 2_000))
        .collect();
    let conflict = make_conflict(local, remotes, Vec::new());
    assert_eq!(fx.resolver.classify(&conflict), Severity::Critical);
}

#[test]
fn weak_support_with_cultural_implication_is_critical() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote =
        version_at(PeerId::new(), json!({"v": 1}), 2_000).with_support(Score::new(0.3));
    let conflict = make_conflict(local, vec![remote], vec!["contested provenance".into()]);
    assert_eq!(fx.resolver.classify(&conflict), Severity::Critical);
}

#[test]
fn solid_support_with_cultural_implication_is_high() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000).with_support(Score::new(0.8));
    let remote =
        version_at(PeerId::new(), json!({"v": 1}), 2_000).with_support(Score::new(0.7));
    let conflict = make_conflict(local, vec![remote], vec!["naming follows protocol".into()]);
    assert_eq!(fx.resolver.classify(&conflict), Severity::High);
}

#[test]
fn wide_reputation_spread_is_high() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let trusted =
        version_at(PeerId::new(), json!({"v": 1}), 2_000).with_reputation(Score::new(0.95));
    let doubted =
        version_at(PeerId::new(), json!({"v": 2}), 2_000).with_reputation(Score::new(0.1));
    let conflict = make_conflict(local, vec![trusted, doubted], Vec::new());
    assert_eq!(fx.resolver.classify(&conflict), Severity::High);
}

#[test]
fn two_divergent_versions_is_medium() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remotes = (1..=2)
        .map(|i| version_at(PeerId::new(), json!({"v": i}), 2_000))
        .collect();
    let conflict = make_conflict(local, remotes, Vec::new());
    assert_eq!(fx.resolver.classify(&conflict), Severity::Medium);
}

#[test]
fn single_quiet_divergence_is_low() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    let conflict = make_conflict(local, vec![remote], Vec::new());
    assert_eq!(fx.resolver.classify(&conflict), Severity::Low);
}

// ── Proposal ─────────────────────────────────────────────────────

#[test]
fn strictly_newer_endorsed_remote_is_chosen() {
    let fx = make_fixture();
    let mut local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    local.cultural_validation =
        ValidationStatus::with_outcome(ValidationState::Pending, Score::new(0.4));
    let mut remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    remote.cultural_validation =
        ValidationStatus::with_outcome(ValidationState::Approved, Score::new(0.8));
    let remote_hash = remote.hash.clone();

    let conflict = make_conflict(local, vec![remote], Vec::new());
    let resolution = fx.resolver.propose_resolution(&conflict);

    match resolution.strategy {
        ResolutionStrategy::ChooseRemote { hash } => assert_eq!(hash, remote_hash),
        other => panic!("expected ChooseRemote, got {other:?}"),
    }
    // Margin 0.4 normalized into the upper half of the confidence scale.
    assert!((resolution.confidence.value() - 0.7).abs() < 1e-9);
}

#[test]
fn newest_local_with_best_consensus_is_kept() {
    let fx = make_fixture();
    let mut local = version_at(PeerId::new(), json!({"v": 0}), 5_000);
    local.cultural_validation =
        ValidationStatus::with_outcome(ValidationState::Approved, Score::new(0.9));
    let mut remote = version_at(PeerId::new(), json!({"v": 1}), 1_000);
    remote.cultural_validation =
        ValidationStatus::with_outcome(ValidationState::Pending, Score::new(0.5));

    let conflict = make_conflict(local, vec![remote], Vec::new());
    let resolution = fx.resolver.propose_resolution(&conflict);
    assert!(matches!(resolution.strategy, ResolutionStrategy::ChooseLocal));
}

#[test]
fn newer_but_less_endorsed_remote_goes_to_community() {
    let fx = make_fixture();
    let mut local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    local.cultural_validation =
        ValidationStatus::with_outcome(ValidationState::Approved, Score::new(0.9));
    let mut remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    remote.cultural_validation =
        ValidationStatus::with_outcome(ValidationState::Pending, Score::new(0.2));

    let conflict = make_conflict(local, vec![remote], Vec::new());
    let resolution = fx.resolver.propose_resolution(&conflict);
    assert!(resolution.strategy.is_community());
}

#[test]
fn disjoint_field_changes_propose_merge() {
    let fx = make_fixture();
    let ancestor = version_at(PeerId::new(), json!({"title": "a", "items": 1}), 1_000);
    let mut local = ancestor.child(
        PeerId::new(),
        json!({"title": "b", "items": 1}),
        ["title".to_string()],
    );
    local.timestamp = HybridTimestamp::new(2_000, 0);
    let mut remote = ancestor.child(
        PeerId::new(),
        json!({"title": "a", "items": 2}),
        ["items".to_string()],
    );
    remote.timestamp = HybridTimestamp::new(2_000, 0);

    let conflict = make_conflict(local, vec![remote], Vec::new());
    let resolution = fx.resolver.propose_resolution(&conflict);
    match resolution.strategy {
        ResolutionStrategy::Merge { fields } => assert_eq!(fields, vec!["items".to_string()]),
        other => panic!("expected Merge, got {other:?}"),
    }
}

#[test]
fn cultural_conflict_with_known_communities_goes_to_authority() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    let mut conflict =
        make_conflict(local, vec![remote], vec!["origin community objects".into()]);
    conflict.cultural_communities = vec!["sami".into()];
    conflict.severity = fx.resolver.classify(&conflict);

    let resolution = fx.resolver.propose_resolution(&conflict);
    match resolution.strategy {
        ResolutionStrategy::CulturalAuthority { communities } => {
            assert_eq!(communities, vec!["sami".to_string()]);
        }
        other => panic!("expected CulturalAuthority, got {other:?}"),
    }
}

proptest! {
    /// High/Critical conflicts with cultural implications always resolve
    /// through a community process.
    #[test]
    fn cultural_high_severity_always_goes_to_community(
        remote_count in 1usize..4,
        supports in prop::collection::vec(0.0f64..=1.0, 4),
        with_communities in any::<bool>(),
    ) {
        let fx = make_fixture();
        let local = version_at(PeerId::new(), json!({"v": "local"}), 1_000)
            .with_support(Score::new(supports[0]));
        let remotes: Vec<CollectionVersion> = (0..remote_count)
            .map(|i| {
                version_at(PeerId::new(), json!({"v": i}), 2_000)
                    .with_support(Score::new(supports[(i + 1) % 4]))
            })
            .collect();

        let mut conflict = make_conflict(
            local,
            remotes,
            vec!["cultural protocol question".into()],
        );
        if with_communities {
            conflict.cultural_communities = vec!["kven".into()];
        }
        conflict.severity = fx.resolver.classify(&conflict);
        prop_assert!(conflict.severity >= Severity::High);

        let resolution = fx.resolver.propose_resolution(&conflict);
        prop_assert!(
            resolution.strategy.is_community(),
            "got {:?} for severity {:?}",
            resolution.strategy,
            conflict.severity
        );
    }
}

// ── Deterministic application ────────────────────────────────────

async fn register_peer(fx: &Fixture) -> PeerId {
    let peer = Peer::new(PeerId::new(), "pk");
    let id = peer.id;
    fx.registry.register(peer).await.unwrap();
    id
}

#[tokio::test]
async fn choose_remote_applies_and_feeds_reputation() {
    let fx = make_fixture();
    let local_author = register_peer(&fx).await;
    let remote_author = register_peer(&fx).await;

    let collection = CollectionId::new();
    let local = version_at(local_author, json!({"v": 0}), 1_000);
    let remote = version_at(remote_author, json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let mut conflict = make_conflict(local, vec![remote.clone()], Vec::new());
    conflict.collection_id = collection;
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    match outcome {
        ResolutionOutcome::Applied { version, resolution } => {
            assert_eq!(version.hash, remote.hash);
            assert!(matches!(resolution.strategy, ResolutionStrategy::ChooseRemote { .. }));
        }
        other => panic!("expected Applied, got {other:?}"),
    }

    // Winner written through, reputation fed back, conflict discarded.
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        remote.hash
    );
    let accepted = fx.registry.get(&remote_author).await.unwrap().reputation;
    assert!((accepted.value() - 0.55).abs() < 1e-9);
    let rejected = fx.registry.get(&local_author).await.unwrap().reputation;
    assert!((rejected.value() - 0.48).abs() < 1e-9);
    assert_eq!(fx.resolver.pending_count().await, 0);
    assert_eq!(fx.resolver.resolved_count(), 1);
    // Deterministic resolutions prune immediately: no audit trail.
    assert!(fx.resolver.audit_versions(&conflict_id).await.is_empty());
}

#[tokio::test]
async fn merge_composes_disjoint_edits() {
    let fx = make_fixture();
    let local_author = register_peer(&fx).await;
    let remote_author = register_peer(&fx).await;

    let collection = CollectionId::new();
    let ancestor = version_at(PeerId::new(), json!({"title": "a", "items": 1}), 1_000);
    let mut local = ancestor.child(
        local_author,
        json!({"title": "renamed", "items": 1}),
        ["title".to_string()],
    );
    local.timestamp = HybridTimestamp::new(2_000, 0);
    let mut remote = ancestor.child(
        remote_author,
        json!({"title": "a", "items": 7}),
        ["items".to_string()],
    );
    remote.timestamp = HybridTimestamp::new(2_000, 0);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let mut conflict = make_conflict(local.clone(), vec![remote.clone()], Vec::new());
    conflict.collection_id = collection;
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    let merged = match outcome {
        ResolutionOutcome::Applied { version, .. } => version,
        other => panic!("expected Applied, got {other:?}"),
    };

    assert_eq!(merged.data, json!({"title": "renamed", "items": 7}));
    assert!(merged.lineage.contains(&local.hash));
    assert!(merged.lineage.contains(&remote.hash));
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        merged.hash
    );

    // Both contributors' edits survived; both get the positive delta.
    for author in [local_author, remote_author] {
        let reputation = fx.registry.get(&author).await.unwrap().reputation;
        assert!((reputation.value() - 0.55).abs() < 1e-9);
    }
}

#[tokio::test]
async fn apply_failure_keeps_conflict_pending() {
    let fx = make_fixture();
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let mut conflict = make_conflict(local, vec![remote.clone()], Vec::new());
    conflict.collection_id = collection;
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    fx.store.set_fail_writes(true);
    match fx.resolver.resolve(conflict_id).await {
        Err(SyncError::ApplyFailed(_)) => {}
        other => panic!("expected ApplyFailed, got {other:?}"),
    }
    assert_eq!(fx.resolver.pending_count().await, 1);

    // Manual retry on the next pass succeeds once the store recovers.
    fx.store.set_fail_writes(false);
    let retried = fx.resolver.retry_pending().await;
    assert_eq!(retried.len(), 1);
    assert!(matches!(retried[0].1, ResolutionOutcome::Applied { .. }));
    assert_eq!(fx.resolver.pending_count().await, 0);
}

#[tokio::test]
async fn unknown_conflict_is_rejected() {
    let fx = make_fixture();
    assert!(matches!(
        fx.resolver.resolve(ConflictId::new()).await,
        Err(SyncError::UnknownConflict(_))
    ));
}

// ── Community vote escalation ────────────────────────────────────

fn community_conflict(
    collection: CollectionId,
    local: CollectionVersion,
    remote: CollectionVersion,
) -> SyncConflict {
    let mut conflict = make_conflict(
        local,
        vec![remote],
        vec!["community reviews contested naming".into()],
    );
    conflict.collection_id = collection;
    conflict.severity = Severity::High;
    conflict.requires_community_input = true;
    conflict
}

#[tokio::test(start_paused = true)]
async fn community_vote_applies_the_leading_option() {
    let fx = make_fixture_with(
        SyncSettings::default(),
        ConsensusConfig {
            participation_target: 1,
            ..ConsensusConfig::default()
        },
    );
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = community_conflict(collection, local.clone(), remote.clone());
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    let resolver = fx.resolver.clone();
    let handle = tokio::spawn(async move { resolver.resolve(conflict_id).await });

    // Wait for the escalation to open its topic, then cast the deciding
    // ballot for adopting the remote.
    let consensus_id = loop {
        if let Some(topic) = fx.consensus.open_topics().await.first() {
            break topic.id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    fx.consensus
        .vote(consensus_id, PeerId::new(), format!("adopt:{}", remote.hash))
        .await
        .unwrap();

    let outcome = handle.await.unwrap().unwrap();
    match outcome {
        ResolutionOutcome::Applied { version, .. } => assert_eq!(version.hash, remote.hash),
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        remote.hash
    );
    // Community-reviewed resolutions keep the rejected side queryable.
    let audit = fx.resolver.audit_versions(&conflict_id).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].hash, local.hash);
}

#[tokio::test(start_paused = true)]
async fn vote_timeout_leaves_conflict_pending_then_retry_applies() {
    let fx = make_fixture_with(
        SyncSettings {
            conflict_resolution_timeout: Duration::from_millis(200),
            ..SyncSettings::default()
        },
        ConsensusConfig::default(),
    );
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = community_conflict(collection, local, remote.clone());
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    // Nobody votes: the escalation times out and the conflict stays
    // pending rather than being dropped.
    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    assert!(matches!(outcome, ResolutionOutcome::Deferred { .. }));
    assert_eq!(fx.resolver.pending_count().await, 1);

    // The community decides later; the scheduled retry picks it up.
    let consensus_id = fx.consensus.open_topics().await[0].id;
    fx.consensus
        .vote(consensus_id, PeerId::new(), format!("adopt:{}", remote.hash))
        .await
        .unwrap();
    fx.consensus.close(consensus_id).await.unwrap();

    let retried = fx.resolver.retry_pending().await;
    assert_eq!(retried.len(), 1);
    assert!(matches!(retried[0].1, ResolutionOutcome::Applied { .. }));
    assert_eq!(fx.resolver.pending_count().await, 0);
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        remote.hash
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_vote_defers_for_reescalation() {
    let fx = make_fixture_with(
        SyncSettings {
            conflict_resolution_timeout: Duration::from_secs(5),
            ..SyncSettings::default()
        },
        ConsensusConfig {
            consensus_threshold: 0.9,
            participation_target: 2,
            ..ConsensusConfig::default()
        },
    );
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = community_conflict(collection, local.clone(), remote.clone());
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    let resolver = fx.resolver.clone();
    let handle = tokio::spawn(async move { resolver.resolve(conflict_id).await });

    let consensus_id = loop {
        if let Some(topic) = fx.consensus.open_topics().await.first() {
            break topic.id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    // A split vote under a 0.9 threshold closes Rejected.
    fx.consensus
        .vote(consensus_id, PeerId::new(), "keep-local")
        .await
        .unwrap();
    fx.consensus
        .vote(consensus_id, PeerId::new(), format!("adopt:{}", remote.hash))
        .await
        .unwrap();

    let outcome = handle.await.unwrap().unwrap();
    assert!(matches!(outcome, ResolutionOutcome::Deferred { .. }));
    assert_eq!(fx.resolver.pending_count().await, 1);
    // Local replica untouched.
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        local.hash
    );
}

#[tokio::test]
async fn deadline_sweep_closes_overdue_votes() {
    let fx = make_fixture_with(
        SyncSettings {
            conflict_resolution_timeout: Duration::from_millis(1),
            ..SyncSettings::default()
        },
        ConsensusConfig {
            vote_window: Duration::from_millis(1),
            ..ConsensusConfig::default()
        },
    );
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = community_conflict(collection, local, remote);
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    // Nobody votes; the escalation times out and the topic stays open.
    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    assert!(matches!(outcome, ResolutionOutcome::Deferred { .. }));
    assert_eq!(fx.consensus.open_topics().await.len(), 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    fx.resolver.sweep_deadlines().await;
    assert!(fx.consensus.open_topics().await.is_empty());

    // The vote closed without a decision, so the conflict stays pending
    // for a fresh escalation instead of being dropped.
    assert_eq!(fx.resolver.pending_count().await, 1);
}

// ── Cultural-authority escalation ────────────────────────────────

fn authority_conflict(
    collection: CollectionId,
    local: CollectionVersion,
    remote: CollectionVersion,
) -> SyncConflict {
    let mut conflict = community_conflict(collection, local, remote);
    conflict.cultural_communities = vec!["sami".into()];
    conflict
}

async fn register_community_validator(fx: &Fixture) -> PeerId {
    let mut peer = Peer::new(PeerId::new(), "pk").with_communities(["sami".to_string()]);
    peer.capabilities.validator = true;
    let id = peer.id;
    fx.registry.register(peer).await.unwrap();
    fx.registry.update_reputation(&id, 0.4).await.unwrap();
    id
}

#[tokio::test]
async fn authority_approval_adopts_the_contested_version() {
    let fx = make_fixture();
    let validator = register_community_validator(&fx).await;

    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = authority_conflict(collection, local, remote.clone());
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    // Escalation registers a targeted validation request.
    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    assert!(matches!(outcome, ResolutionOutcome::Deferred { .. }));
    let requests = fx.validation.open_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].collection_id, collection);
    assert!(requests[0].target_validators.contains(&validator));

    // Validators affirm the contested version; the retry applies it.
    fx.validation
        .submit_validation(requests[0].id, validator, Score::new(0.9))
        .await
        .unwrap();
    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    match outcome {
        ResolutionOutcome::Applied { version, resolution } => {
            assert_eq!(version.hash, remote.hash);
            assert!(matches!(resolution.strategy, ResolutionStrategy::ChooseRemote { .. }));
        }
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        remote.hash
    );
}

#[tokio::test]
async fn authority_rejection_keeps_the_local_version() {
    let fx = make_fixture();
    let validator = register_community_validator(&fx).await;

    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = authority_conflict(collection, local.clone(), remote);
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    fx.resolver.resolve(conflict_id).await.unwrap();
    let requests = fx.validation.open_requests().await;
    fx.validation
        .submit_validation(requests[0].id, validator, Score::new(0.1))
        .await
        .unwrap();

    let outcome = fx.resolver.resolve(conflict_id).await.unwrap();
    match outcome {
        ResolutionOutcome::Applied { version, resolution } => {
            assert_eq!(version.hash, local.hash);
            assert!(matches!(resolution.strategy, ResolutionStrategy::ChooseLocal));
        }
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        local.hash
    );
}

#[tokio::test]
async fn deadline_sweep_emits_advisories_for_unanswered_requests() {
    let fx = make_fixture_with(
        SyncSettings {
            conflict_resolution_timeout: Duration::from_millis(1),
            ..SyncSettings::default()
        },
        ConsensusConfig::default(),
    );
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = authority_conflict(collection, local.clone(), remote);
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;
    fx.resolver.resolve(conflict_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let advisories = fx.resolver.sweep_deadlines().await;
    assert_eq!(advisories.len(), 1);
    assert_eq!(advisories[0].collection_id, collection);

    // Expiry is advisory: the conflict still pends and the replica is
    // untouched.
    assert_eq!(fx.resolver.pending_count().await, 1);
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        local.hash
    );
}

// ── Direct application ───────────────────────────────────────────

#[tokio::test]
async fn apply_defers_community_strategies_without_side_effects() {
    let fx = make_fixture();
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let mut conflict = make_conflict(local.clone(), vec![remote], Vec::new());
    conflict.collection_id = collection;
    let resolution = arkivo_sync::ConflictResolution {
        strategy: ResolutionStrategy::CommunityVote { topic: "t".into() },
        confidence: Score::new(0.25),
        reasoning: Vec::new(),
        cultural_considerations: Vec::new(),
        required_actions: Vec::new(),
        estimated_time_minutes: 60,
    };

    let outcome = fx.resolver.apply(&conflict, &resolution).await.unwrap();
    assert!(matches!(outcome, arkivo_sync::ApplyOutcome::Deferred));
    // Nothing written, no vote opened.
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        local.hash
    );
    assert!(fx.consensus.open_topics().await.is_empty());
}

#[tokio::test]
async fn apply_writes_concrete_strategies_through() {
    let fx = make_fixture();
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let mut conflict = make_conflict(local, vec![remote.clone()], Vec::new());
    conflict.collection_id = collection;
    let resolution = fx.resolver.propose_resolution(&conflict);

    let outcome = fx.resolver.apply(&conflict, &resolution).await.unwrap();
    match outcome {
        arkivo_sync::ApplyOutcome::Applied(version) => assert_eq!(version.hash, remote.hash),
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(
        fx.store.load_collection(&collection).unwrap().unwrap().hash,
        remote.hash
    );
}

// ── Manual resolution ────────────────────────────────────────────

#[tokio::test]
async fn operator_can_resolve_manually() {
    let fx = make_fixture();
    let collection = CollectionId::new();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    fx.store.save_collection(&collection, local.clone()).unwrap();

    let conflict = community_conflict(collection, local, remote.clone());
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    let outcome = fx
        .resolver
        .resolve_with(
            conflict_id,
            ResolutionStrategy::ChooseRemote {
                hash: remote.hash.clone(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ResolutionOutcome::Applied { .. }));
    assert_eq!(fx.resolver.pending_count().await, 0);
}

#[tokio::test]
async fn manual_resolution_rejects_community_strategies() {
    let fx = make_fixture();
    let local = version_at(PeerId::new(), json!({"v": 0}), 1_000);
    let remote = version_at(PeerId::new(), json!({"v": 1}), 2_000);
    let conflict = make_conflict(local, vec![remote], Vec::new());
    let conflict_id = conflict.id;
    fx.resolver.admit(conflict).await;

    let result = fx
        .resolver
        .resolve_with(
            conflict_id,
            ResolutionStrategy::CommunityVote {
                topic: "t".into(),
            },
        )
        .await;
    assert!(matches!(result, Err(SyncError::ApplyFailed(_))));
}
