//! Network health metrics derived from the peer table.
//!
//! The monitor is a pure function of a registry snapshot. It never mutates
//! peer state and never blocks callers: if a recompute is already in
//! flight, `refresh` hands back the last published value instead of
//! waiting.

use crate::peer::{Peer, PeerFilter, PeerStatus};
use crate::registry::PeerRegistry;
use arkivo_types::Score;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Aggregate network-quality metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkHealth {
    /// Inverse of peer-degree concentration: 1 minus the Herfindahl index
    /// over per-peer address counts. High when connectivity is spread
    /// evenly, zero when a single peer carries all paths.
    pub decentralization_score: Score,
    /// Fraction of connected peers reachable through at least two distinct
    /// paths (multiple addresses, or a relay capability).
    pub censorship_resistance: Score,
    /// Distinct cultural communities across connected peers, normalized by
    /// the connected-peer count.
    pub cultural_diversity: Score,
    /// Number of currently connected peers.
    pub connected_peers: usize,
    /// Number of known peers.
    pub total_peers: usize,
}

impl Default for NetworkHealth {
    fn default() -> Self {
        Self {
            decentralization_score: Score::MIN,
            censorship_resistance: Score::MIN,
            cultural_diversity: Score::MIN,
            connected_peers: 0,
            total_peers: 0,
        }
    }
}

/// Computes and caches `NetworkHealth` from registry snapshots.
pub struct NetworkHealthMonitor {
    registry: Arc<PeerRegistry>,
    latest: watch::Sender<NetworkHealth>,
    recompute: Mutex<()>,
}

impl NetworkHealthMonitor {
    /// Creates a monitor over the given registry.
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        let (latest, _) = watch::channel(NetworkHealth::default());
        Self {
            registry,
            latest,
            recompute: Mutex::new(()),
        }
    }

    /// Returns the last published health value without recomputing.
    pub fn latest(&self) -> NetworkHealth {
        self.latest.borrow().clone()
    }

    /// Returns a receiver that observes every published health value.
    pub fn watch(&self) -> watch::Receiver<NetworkHealth> {
        self.latest.subscribe()
    }

    /// Recomputes health from a fresh registry snapshot. If another
    /// recompute is already in flight, returns the last published value
    /// immediately instead of blocking.
    pub async fn refresh(&self) -> NetworkHealth {
        let Ok(_guard) = self.recompute.try_lock() else {
            return self.latest();
        };
        let peers = self.registry.list_peers(PeerFilter::All).await;
        let health = Self::compute(&peers);
        self.latest.send_replace(health.clone());
        health
    }

    /// Spawns a task that refreshes on every peer event until the registry
    /// is dropped.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.registry.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(_) => {
                        let health = self.refresh().await;
                        debug!(
                            "Network health: {}/{} connected, decentralization {}",
                            health.connected_peers,
                            health.total_peers,
                            health.decentralization_score
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Pure metric computation over a peer snapshot.
    #[must_use]
    pub fn compute(peers: &[Peer]) -> NetworkHealth {
        let connected: Vec<&Peer> = peers
            .iter()
            .filter(|peer| peer.status == PeerStatus::Connected)
            .collect();

        let decentralization_score = {
            let total_degree: usize = connected.iter().map(|p| p.addresses.len()).sum();
            if total_degree == 0 {
                Score::MIN
            } else {
                let herfindahl: f64 = connected
                    .iter()
                    .map(|p| {
                        let share = p.addresses.len() as f64 / total_degree as f64;
                        share * share
                    })
                    .sum();
                Score::new(1.0 - herfindahl)
            }
        };

        let censorship_resistance = if connected.is_empty() {
            Score::MIN
        } else {
            let multipath = connected
                .iter()
                .filter(|p| p.addresses.len() >= 2 || p.capabilities.relay)
                .count();
            Score::new(multipath as f64 / connected.len() as f64)
        };

        let cultural_diversity = if connected.is_empty() {
            Score::MIN
        } else {
            let communities: HashSet<&str> = connected
                .iter()
                .flat_map(|p| p.cultural_communities.iter().map(String::as_str))
                .collect();
            Score::new(communities.len() as f64 / connected.len() as f64)
        };

        NetworkHealth {
            decentralization_score,
            censorship_resistance,
            cultural_diversity,
            connected_peers: connected.len(),
            total_peers: peers.len(),
        }
    }
}
