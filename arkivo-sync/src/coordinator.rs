//! Per-collection synchronization.
//!
//! The coordinator pulls version summaries from connected peers that
//! advertise a collection, detects divergence by content hash and lineage,
//! and hands materialized conflicts to the resolver. Each collection moves
//! `Idle → Syncing → {Idle, ConflictsPending}`; passes for the same
//! collection are single-flight, passes for different collections run in
//! parallel up to a configured bound.

use crate::config::SyncSettings;
use crate::conflict::{ConflictDetail, Severity, SyncConflict};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    SummaryRequestMessage, SyncMessage, VersionRequestMessage, VersionSummary,
};
use crate::resolver::ConflictResolver;
use crate::store::CollectionStore;
use crate::sync_transport::SyncTransport;
use arkivo_peer::{Peer, PeerRegistry};
use arkivo_types::{
    CollectionId, CollectionVersion, ConflictId, ContentHash, HybridTimestamp, PeerId,
    ValidationState,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Where a collection stands in the sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionSyncState {
    /// Nothing in flight and nothing unresolved.
    #[default]
    Idle,
    /// A sync pass is running.
    Syncing,
    /// A detected conflict awaits resolution.
    ConflictsPending,
}

/// How one sync pass for one collection ended.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Replicas agree; nothing to do.
    Clean,
    /// A strictly newer remote version was fast-forwarded into the store.
    Updated(ContentHash),
    /// Divergence was detected and handed to the resolver.
    Conflict(SyncConflict),
    /// The pass could not complete.
    Failed(String),
}

/// Outcome plus the per-peer errors encountered along the way.
#[derive(Debug, Clone)]
pub struct CollectionSyncResult {
    /// The collection synced.
    pub collection_id: CollectionId,
    /// How the pass ended.
    pub outcome: SyncOutcome,
    /// Transient failures that did not abort the pass.
    pub errors: Vec<String>,
}

/// Batch result of a full sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// One entry per collection, in completion order.
    pub results: Vec<CollectionSyncResult>,
    /// Failures outside any single collection, e.g. listing the store.
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Collections that ended clean or fast-forwarded.
    #[must_use]
    pub fn clean_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, SyncOutcome::Clean | SyncOutcome::Updated(_)))
            .count()
    }

    /// Conflicts detected in this pass.
    #[must_use]
    pub fn conflicts(&self) -> Vec<&SyncConflict> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                SyncOutcome::Conflict(conflict) => Some(conflict),
                _ => None,
            })
            .collect()
    }
}

/// Counters for the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub collections_tracked: usize,
    pub clean_syncs: usize,
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub conflicts_pending: usize,
    pub sync_errors: usize,
}

type InFlightMap = Mutex<HashMap<CollectionId, watch::Receiver<Option<CollectionSyncResult>>>>;

/// Drives synchronization for every local collection.
pub struct SyncCoordinator {
    settings: SyncSettings,
    registry: Arc<PeerRegistry>,
    store: Arc<dyn CollectionStore>,
    transport: Arc<dyn SyncTransport>,
    resolver: Arc<ConflictResolver>,
    in_flight: InFlightMap,
    states: RwLock<HashMap<CollectionId, CollectionSyncState>>,
    clean_syncs: AtomicUsize,
    conflicts_detected: AtomicUsize,
    sync_errors: AtomicUsize,
    shutdown: watch::Sender<bool>,
}

impl SyncCoordinator {
    /// Creates a coordinator wired to its collaborators.
    pub fn new(
        registry: Arc<PeerRegistry>,
        store: Arc<dyn CollectionStore>,
        transport: Arc<dyn SyncTransport>,
        resolver: Arc<ConflictResolver>,
        settings: SyncSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            settings,
            registry,
            store,
            transport,
            resolver,
            in_flight: Mutex::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            clean_syncs: AtomicUsize::new(0),
            conflicts_detected: AtomicUsize::new(0),
            sync_errors: AtomicUsize::new(0),
            shutdown,
        }
    }

    /// The resolver that owns this coordinator's detected conflicts.
    pub fn resolver(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    /// Where a collection currently stands.
    pub async fn state_of(&self, collection_id: &CollectionId) -> CollectionSyncState {
        self.states
            .read()
            .await
            .get(collection_id)
            .copied()
            .unwrap_or_default()
    }

    /// Counters for display.
    pub async fn stats(&self) -> SyncStats {
        SyncStats {
            collections_tracked: self
                .store
                .list_collection_ids()
                .map(|ids| ids.len())
                .unwrap_or(0),
            clean_syncs: self.clean_syncs.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.resolver.resolved_count(),
            conflicts_pending: self.resolver.pending_count().await,
            sync_errors: self.sync_errors.load(Ordering::Relaxed),
        }
    }

    /// Cancels in-flight syncs. Conflicts already detected stay pending
    /// for resumption after restart.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Spawns the scheduled loop: sweep deadlines, retry pending conflicts,
    /// then sync every collection, every `sync_interval`, until shutdown.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.sync_interval);
            let mut shutdown = this.shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let advisories = this.resolver.sweep_deadlines().await;
                        if !advisories.is_empty() {
                            debug!("Deadline sweep emitted {} advisories", advisories.len());
                        }
                        let retried = this.resolver.retry_pending().await;
                        if !retried.is_empty() {
                            debug!("Retried {} pending conflicts", retried.len());
                        }
                        let report = this.sync_all_collections().await;
                        debug!(
                            "Sync pass: {} clean, {} conflicts, {} errors",
                            report.clean_count(),
                            report.conflicts().len(),
                            report.errors.len()
                        );
                    }
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
        })
    }

    /// Syncs one collection. Single-flight: a second call for the same
    /// collection while a pass is running awaits and returns that pass's
    /// result instead of starting a duplicate.
    pub async fn sync_collection(&self, collection_id: CollectionId) -> CollectionSyncResult {
        let sender = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(&collection_id) {
                Some(receiver) => {
                    let mut receiver = receiver.clone();
                    drop(in_flight);
                    return match receiver.wait_for(|result| result.is_some()).await {
                        Ok(guard) => guard.clone().expect("wait_for guarantees Some"),
                        Err(_) => CollectionSyncResult {
                            collection_id,
                            outcome: SyncOutcome::Failed("sync pass aborted".into()),
                            errors: Vec::new(),
                        },
                    };
                }
                None => {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(collection_id, receiver);
                    sender
                }
            }
        };

        // Cleared on drop, so a pass cancelled mid-await does not leave the
        // collection permanently marked in flight.
        let _guard = InFlightGuard {
            map: &self.in_flight,
            collection_id,
        };
        let result = self.do_sync(collection_id).await;
        let _ = sender.send(Some(result.clone()));
        result
    }

    /// Fans `sync_collection` out over every local collection with bounded
    /// concurrency. Individual failures never abort the batch.
    pub async fn sync_all_collections(&self) -> SyncReport {
        let ids = match self.store.list_collection_ids() {
            Ok(ids) => ids,
            Err(e) => {
                return SyncReport {
                    results: Vec::new(),
                    errors: vec![format!("listing collections: {e}")],
                };
            }
        };

        let results = stream::iter(ids)
            .map(|id| self.sync_collection(id))
            .buffer_unordered(self.settings.max_concurrent_syncs)
            .collect::<Vec<_>>()
            .await;

        SyncReport {
            results,
            errors: Vec::new(),
        }
    }

    // ── One sync pass ────────────────────────────────────────────

    async fn do_sync(&self, collection_id: CollectionId) -> CollectionSyncResult {
        self.set_state(collection_id, CollectionSyncState::Syncing).await;

        let mut errors = Vec::new();
        let outcome = self.run_sync(collection_id, &mut errors).await;

        self.sync_errors.fetch_add(errors.len(), Ordering::Relaxed);
        let next_state = match &outcome {
            SyncOutcome::Conflict(_) => {
                self.conflicts_detected.fetch_add(1, Ordering::Relaxed);
                CollectionSyncState::ConflictsPending
            }
            SyncOutcome::Clean | SyncOutcome::Updated(_) => {
                self.clean_syncs.fetch_add(1, Ordering::Relaxed);
                if self.resolver.has_pending(&collection_id).await {
                    CollectionSyncState::ConflictsPending
                } else {
                    CollectionSyncState::Idle
                }
            }
            SyncOutcome::Failed(_) => {
                self.sync_errors.fetch_add(1, Ordering::Relaxed);
                CollectionSyncState::Idle
            }
        };
        self.set_state(collection_id, next_state).await;

        CollectionSyncResult {
            collection_id,
            outcome,
            errors,
        }
    }

    async fn run_sync(
        &self,
        collection_id: CollectionId,
        errors: &mut Vec<String>,
    ) -> SyncOutcome {
        if self.is_shutting_down() {
            return SyncOutcome::Failed("shutting down".into());
        }

        let local = match self.store.load_collection(&collection_id) {
            Ok(local) => local,
            Err(e) => return SyncOutcome::Failed(format!("loading local replica: {e}")),
        };

        let peers: Vec<Peer> = self
            .registry
            .connected_peers()
            .await
            .into_iter()
            .filter(|peer| peer.advertises(&collection_id))
            .collect();
        if peers.is_empty() {
            debug!("No connected peers advertise collection {}", collection_id);
            return SyncOutcome::Clean;
        }

        let mut summaries: Vec<(PeerId, VersionSummary)> = Vec::new();
        for peer in &peers {
            if self.is_shutting_down() {
                return SyncOutcome::Failed("shutting down".into());
            }
            match self.fetch_summary(peer.id, collection_id).await {
                Ok(Some(summary)) => summaries.push((peer.id, summary)),
                Ok(None) => debug!("Peer {} no longer holds {}", peer.id, collection_id),
                Err(SyncError::ShuttingDown) => {
                    return SyncOutcome::Failed("shutting down".into());
                }
                Err(e) => {
                    warn!("Summary fetch from {} failed: {}", peer.id, e);
                    errors.push(format!("summary from {}: {e}", peer.id));
                    let _ = self.registry.disconnect(&peer.id).await;
                }
            }
        }

        let Some(local) = local else {
            return self.bootstrap_replica(collection_id, summaries, errors).await;
        };

        // Identical content everywhere: clean unless validation outcomes
        // disagree on that same content.
        if summaries.iter().all(|(_, s)| s.hash == local.hash) {
            let disputing: Vec<PeerId> = summaries
                .iter()
                .filter(|(_, s)| s.validation_state != local.cultural_validation.state)
                .map(|(peer, _)| *peer)
                .collect();
            if disputing.is_empty() {
                debug!("Collection {} is in sync across {} peers", collection_id, summaries.len());
                return SyncOutcome::Clean;
            }
            return self
                .cultural_dispute(collection_id, local, disputing, errors)
                .await;
        }

        // Partition remotes by their relation to the local version.
        let mut divergent: Vec<(PeerId, VersionSummary)> = Vec::new();
        let mut descendants: Vec<(PeerId, VersionSummary)> = Vec::new();
        for (peer, summary) in summaries {
            if summary.hash == local.hash || local.lineage.contains(&summary.hash) {
                // Same content, or a stale remote we are already past.
                continue;
            }
            if summary.lineage.contains(&local.hash) {
                descendants.push((peer, summary));
            } else {
                divergent.push((peer, summary));
            }
        }

        if divergent.is_empty() {
            if let Some((peer, summary)) = descendants
                .into_iter()
                .max_by_key(|(_, s)| (s.lineage.len(), s.timestamp))
            {
                return self
                    .fast_forward(collection_id, peer, summary, errors)
                    .await;
            }
            return SyncOutcome::Clean;
        }

        // Materialize one full version per distinct divergent hash.
        let mut remote_versions: Vec<CollectionVersion> = Vec::new();
        let mut fetched: BTreeSet<String> = BTreeSet::new();
        for (peer, summary) in &divergent {
            if !fetched.insert(summary.hash.as_str().to_string()) {
                continue;
            }
            match self.fetch_version(*peer, collection_id, summary.hash.clone()).await {
                Ok(Some(version)) => remote_versions.push(version),
                Ok(None) => errors.push(format!(
                    "peer {} no longer holds version {}",
                    peer,
                    summary.hash.short()
                )),
                Err(e) => {
                    errors.push(format!("version fetch from {peer}: {e}"));
                    let _ = self.registry.disconnect(peer).await;
                }
            }
        }
        if remote_versions.is_empty() {
            return SyncOutcome::Failed(
                "divergence detected but no divergent version could be fetched".into(),
            );
        }

        let conflict = self
            .build_conflict(collection_id, local, remote_versions, None)
            .await;
        info!(
            "Detected {:?} conflict {} on collection {} ({} divergent versions)",
            conflict.detail,
            conflict.id,
            collection_id,
            conflict.remote_versions.len()
        );
        self.resolver.admit(conflict.clone()).await;
        SyncOutcome::Conflict(conflict)
    }

    async fn bootstrap_replica(
        &self,
        collection_id: CollectionId,
        summaries: Vec<(PeerId, VersionSummary)>,
        errors: &mut Vec<String>,
    ) -> SyncOutcome {
        let Some((peer, summary)) = summaries
            .into_iter()
            .max_by_key(|(_, s)| s.timestamp)
        else {
            return SyncOutcome::Clean;
        };

        match self.fetch_version(peer, collection_id, summary.hash.clone()).await {
            Ok(Some(version)) => {
                let hash = version.hash.clone();
                match self.store.save_collection(&collection_id, version) {
                    Ok(()) => {
                        info!(
                            "Bootstrapped collection {} from peer {} at {}",
                            collection_id,
                            peer,
                            hash.short()
                        );
                        SyncOutcome::Updated(hash)
                    }
                    Err(e) => SyncOutcome::Failed(format!("saving bootstrap version: {e}")),
                }
            }
            Ok(None) => SyncOutcome::Failed(format!(
                "peer {peer} withdrew version {} during bootstrap",
                summary.hash.short()
            )),
            Err(e) => {
                errors.push(format!("bootstrap fetch from {peer}: {e}"));
                SyncOutcome::Failed("no local replica and bootstrap fetch failed".into())
            }
        }
    }

    async fn fast_forward(
        &self,
        collection_id: CollectionId,
        peer: PeerId,
        summary: VersionSummary,
        errors: &mut Vec<String>,
    ) -> SyncOutcome {
        match self.fetch_version(peer, collection_id, summary.hash.clone()).await {
            Ok(Some(version)) => {
                let hash = version.hash.clone();
                match self.store.save_collection(&collection_id, version) {
                    Ok(()) => {
                        info!(
                            "Fast-forwarded collection {} to descendant {} from {}",
                            collection_id,
                            hash.short(),
                            peer
                        );
                        SyncOutcome::Updated(hash)
                    }
                    Err(e) => SyncOutcome::Failed(format!("saving fast-forward: {e}")),
                }
            }
            Ok(None) => {
                errors.push(format!(
                    "peer {peer} withdrew descendant {}",
                    summary.hash.short()
                ));
                SyncOutcome::Clean
            }
            Err(e) => {
                errors.push(format!("fast-forward fetch from {peer}: {e}"));
                let _ = self.registry.disconnect(&peer).await;
                SyncOutcome::Clean
            }
        }
    }

    async fn cultural_dispute(
        &self,
        collection_id: CollectionId,
        local: CollectionVersion,
        disputing: Vec<PeerId>,
        errors: &mut Vec<String>,
    ) -> SyncOutcome {
        // Same content on both sides; fetch one disputing peer's replica
        // to capture its validation metadata.
        let mut remote = None;
        for peer in &disputing {
            match self.fetch_version(*peer, collection_id, local.hash.clone()).await {
                Ok(Some(version)) => {
                    remote = Some(version);
                    break;
                }
                Ok(None) => {}
                Err(e) => errors.push(format!("dispute fetch from {peer}: {e}")),
            }
        }
        let Some(remote) = remote else {
            return SyncOutcome::Failed(
                "validation outcomes disagree but no disputing replica could be fetched".into(),
            );
        };

        let contested = local.hash.clone();
        let conflict = self
            .build_conflict(collection_id, local, vec![remote], Some(contested))
            .await;
        info!(
            "Detected cultural dispute {} on collection {}",
            conflict.id, collection_id
        );
        self.resolver.admit(conflict.clone()).await;
        SyncOutcome::Conflict(conflict)
    }

    async fn build_conflict(
        &self,
        collection_id: CollectionId,
        local: CollectionVersion,
        remotes: Vec<CollectionVersion>,
        contested: Option<ContentHash>,
    ) -> SyncConflict {
        let implications = cultural_implications(
            &local,
            &remotes,
            contested.is_some(),
            self.resolver.config().contested_support,
        );

        let mut communities: BTreeSet<String> = BTreeSet::new();
        for version in std::iter::once(&local).chain(remotes.iter()) {
            if let Some(peer) = self.registry.get(&version.peer_id).await {
                communities.extend(peer.cultural_communities.iter().cloned());
            }
        }

        let detail = match contested {
            Some(contested) => ConflictDetail::CulturalDispute { contested },
            None => match disjoint_metadata_fields(&local, &remotes) {
                Some(fields) => ConflictDetail::Metadata { fields },
                None => ConflictDetail::Version,
            },
        };

        let mut conflict = SyncConflict {
            id: ConflictId::new(),
            collection_id,
            detail,
            local_version: local,
            remote_versions: remotes,
            severity: Severity::Low,
            cultural_implications: implications,
            cultural_communities: communities.into_iter().collect(),
            suggested_resolution: None,
            requires_community_input: false,
            timestamp: HybridTimestamp::now(),
        };
        conflict.severity = self.resolver.classify(&conflict);
        let proposed = self.resolver.propose_resolution(&conflict);
        conflict.requires_community_input = proposed.strategy.is_community();
        conflict.suggested_resolution = Some(proposed.strategy);
        conflict
    }

    // ── Peer exchange with bounded retry ─────────────────────────

    async fn fetch_summary(
        &self,
        peer_id: PeerId,
        collection_id: CollectionId,
    ) -> SyncResult<Option<VersionSummary>> {
        self.with_retry(|| async move {
            let reply = self
                .transport
                .send_request(
                    &peer_id,
                    SyncMessage::SummaryRequest(SummaryRequestMessage { collection_id }),
                )
                .await?;
            match reply {
                SyncMessage::SummaryResponse(response) => Ok(response.summary),
                SyncMessage::Error(e) => Err(SyncError::Protocol(e.message)),
                other => Err(SyncError::Protocol(format!(
                    "unexpected reply to SummaryRequest: {}",
                    other.kind()
                ))),
            }
        })
        .await
    }

    async fn fetch_version(
        &self,
        peer_id: PeerId,
        collection_id: CollectionId,
        hash: ContentHash,
    ) -> SyncResult<Option<CollectionVersion>> {
        self.with_retry(|| {
            let hash = hash.clone();
            async move {
                let reply = self
                    .transport
                    .send_request(
                        &peer_id,
                        SyncMessage::VersionRequest(VersionRequestMessage {
                            collection_id,
                            hash,
                        }),
                    )
                    .await?;
                match reply {
                    SyncMessage::VersionResponse(response) => Ok(response.version),
                    SyncMessage::Error(e) => Err(SyncError::Protocol(e.message)),
                    other => Err(SyncError::Protocol(format!(
                        "unexpected reply to VersionRequest: {}",
                        other.kind()
                    ))),
                }
            }
        })
        .await
    }

    /// Runs a network operation with exponential backoff on transient
    /// failures, up to the configured attempt bound.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut delay = self.settings.retry_base_delay;
        let mut last = None;
        for attempt in 0..self.settings.retry_max_attempts {
            if attempt > 0 {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = self.cancelled() => return Err(SyncError::ShuttingDown),
                }
                delay *= 2;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    debug!("Attempt {} failed transiently: {}", attempt + 1, e);
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or(SyncError::Timeout))
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn cancelled(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|stop| *stop).await;
    }

    async fn set_state(&self, collection_id: CollectionId, state: CollectionSyncState) {
        self.states.write().await.insert(collection_id, state);
    }
}

/// Removes a collection's in-flight entry when its sync pass ends, whether
/// the pass ran to completion or was cancelled at an await point.
struct InFlightGuard<'a> {
    map: &'a InFlightMap,
    collection_id: CollectionId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.map.lock() {
            map.remove(&self.collection_id);
        }
    }
}

/// Advisory notes on the cultural stakes of a divergence. Empty for
/// conflicts with no cultural signal, which keeps them on the
/// deterministic resolution path.
fn cultural_implications(
    local: &CollectionVersion,
    remotes: &[CollectionVersion],
    dispute: bool,
    contested_support: f64,
) -> Vec<String> {
    let mut implications = Vec::new();
    if dispute {
        implications
            .push("identical content carries conflicting validation outcomes across peers".into());
    }
    for version in std::iter::once(local).chain(remotes.iter()) {
        match version.cultural_validation.state {
            ValidationState::Disputed => implications.push(format!(
                "version {} is disputed by validators",
                version.hash.short()
            )),
            ValidationState::Rejected => implications.push(format!(
                "version {} was assessed culturally inappropriate",
                version.hash.short()
            )),
            _ => {}
        }
        if version.community_support.value() < contested_support {
            implications.push(format!(
                "version {} holds weak community support ({})",
                version.hash.short(),
                version.community_support
            ));
        }
    }
    implications
}

/// If every version changed a non-empty, pairwise-disjoint set of fields,
/// the divergence is purely metadata and the union of remote fields is
/// returned.
fn disjoint_metadata_fields(
    local: &CollectionVersion,
    remotes: &[CollectionVersion],
) -> Option<Vec<String>> {
    let mut seen = local.changed_fields.clone();
    let mut fields = Vec::new();
    for remote in remotes {
        if remote.changed_fields.is_empty() {
            return None;
        }
        for field in &remote.changed_fields {
            if !seen.insert(field.clone()) {
                return None;
            }
            fields.push(field.clone());
        }
    }
    if fields.is_empty() { None } else { Some(fields) }
}
