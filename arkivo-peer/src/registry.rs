//! Peer registry — the single owner of the peer table.
//!
//! All mutation of peer records goes through the registry so that status
//! transitions, the `max_peers` admission cap, and the `[0,1]` reputation
//! bound hold everywhere. Connection and disconnection are published on a
//! broadcast channel; the health monitor and the sync layer subscribe
//! rather than polling the table.

use crate::config::PeerConfig;
use crate::error::{PeerError, PeerResult};
use crate::peer::{Peer, PeerCapabilities, PeerFilter, PeerStatus};
use crate::transport::{Channel, Transport};
use arkivo_types::{HybridTimestamp, PeerId, Score};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Observable change to the peer table.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A channel to the peer was established.
    Connected(PeerId),
    /// The peer's channel was torn down.
    Disconnected(PeerId),
    /// The peer's reputation moved.
    ReputationChanged {
        peer_id: PeerId,
        reputation: Score,
    },
}

/// Tracks known peers, their connection state, capabilities, and
/// reputation.
pub struct PeerRegistry {
    config: PeerConfig,
    transport: Arc<dyn Transport>,
    peers: RwLock<HashMap<PeerId, Peer>>,
    channels: Mutex<HashMap<PeerId, Channel>>,
    events: broadcast::Sender<PeerEvent>,
}

impl PeerRegistry {
    /// Creates a registry over the given transport.
    pub fn new(transport: Arc<dyn Transport>, config: PeerConfig) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            config,
            transport,
            peers: RwLock::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Our own peer identity.
    pub fn local_peer(&self) -> PeerId {
        self.config.local_peer
    }

    /// Subscribes to peer events.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Admits a peer into the table. Re-registering a known peer replaces
    /// its record; admitting a new peer beyond `max_peers` is rejected.
    pub async fn register(&self, peer: Peer) -> PeerResult<()> {
        let mut peers = self.peers.write().await;
        if !peers.contains_key(&peer.id) && peers.len() >= self.config.max_peers {
            return Err(PeerError::AtCapacity(self.config.max_peers));
        }
        debug!("Registered peer {} ({} addresses)", peer.id, peer.addresses.len());
        peers.insert(peer.id, peer);
        Ok(())
    }

    /// Registers one placeholder peer per configured bootstrap address.
    /// Identities are provisional until the first handshake replaces them.
    pub async fn bootstrap(&self) -> Vec<Peer> {
        let mut registered = Vec::new();
        for address in self.config.bootstrap_peers.clone() {
            let peer = Peer::new(PeerId::new(), "").with_address(address);
            match self.register(peer.clone()).await {
                Ok(()) => registered.push(peer),
                Err(e) => {
                    warn!("Skipping bootstrap peer {}: {}", peer.addresses[0], e);
                    break;
                }
            }
        }
        registered
    }

    /// Returns a snapshot of a peer record.
    pub async fn get(&self, peer_id: &PeerId) -> Option<Peer> {
        self.peers.read().await.get(peer_id).cloned()
    }

    /// Returns snapshots of peers passing the filter.
    pub async fn list_peers(&self, filter: PeerFilter) -> Vec<Peer> {
        self.peers
            .read()
            .await
            .values()
            .filter(|peer| filter.matches(peer))
            .cloned()
            .collect()
    }

    /// Returns snapshots of all connected peers.
    pub async fn connected_peers(&self) -> Vec<Peer> {
        self.list_peers(PeerFilter::Status(PeerStatus::Connected)).await
    }

    /// Returns a peer's capability set.
    pub async fn capabilities_of(&self, peer_id: &PeerId) -> PeerResult<PeerCapabilities> {
        self.peers
            .read()
            .await
            .get(peer_id)
            .map(|peer| peer.capabilities.clone())
            .ok_or(PeerError::UnknownPeer(*peer_id))
    }

    /// Replaces a peer's capability set, e.g. after a handshake refresh.
    pub async fn update_capabilities(
        &self,
        peer_id: &PeerId,
        capabilities: PeerCapabilities,
    ) -> PeerResult<()> {
        let mut peers = self.peers.write().await;
        let peer = peers.get_mut(peer_id).ok_or(PeerError::UnknownPeer(*peer_id))?;
        peer.capabilities = capabilities;
        Ok(())
    }

    /// Refreshes a peer's last-seen timestamp.
    pub async fn touch(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().await.get_mut(peer_id) {
            peer.last_seen = HybridTimestamp::now();
        }
    }

    /// Establishes a channel to a known peer.
    ///
    /// Transitions `Disconnected → Connecting → Connected`. If no address
    /// answers within `connect_timeout`, the peer is left `Disconnected`
    /// and the attempt fails with `Unreachable`.
    pub async fn connect(&self, peer_id: &PeerId) -> PeerResult<()> {
        let addresses = {
            let mut peers = self.peers.write().await;
            let peer = peers.get_mut(peer_id).ok_or(PeerError::UnknownPeer(*peer_id))?;
            if peer.status == PeerStatus::Connected {
                return Ok(());
            }
            peer.status = PeerStatus::Connecting;
            peer.addresses.clone()
        };

        let attempt = async {
            for address in &addresses {
                match self.transport.connect(address).await {
                    Ok(channel) => return Ok(channel),
                    Err(e) => debug!("Connect to {} via {} failed: {}", peer_id, address, e),
                }
            }
            Err(PeerError::Unreachable(format!(
                "no reachable address for {peer_id}"
            )))
        };

        match timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(channel)) => {
                self.channels.lock().await.insert(*peer_id, channel);
                if let Some(peer) = self.peers.write().await.get_mut(peer_id) {
                    peer.status = PeerStatus::Connected;
                    peer.last_seen = HybridTimestamp::now();
                }
                info!("Connected to peer {}", peer_id);
                let _ = self.events.send(PeerEvent::Connected(*peer_id));
                Ok(())
            }
            Ok(Err(e)) => {
                self.mark_disconnected(peer_id).await;
                Err(e)
            }
            Err(_) => {
                self.mark_disconnected(peer_id).await;
                Err(PeerError::Unreachable(format!(
                    "connect to {peer_id} timed out"
                )))
            }
        }
    }

    /// Tears down the channel to a peer and marks it disconnected.
    pub async fn disconnect(&self, peer_id: &PeerId) -> PeerResult<()> {
        let was_connected = {
            let mut peers = self.peers.write().await;
            let peer = peers.get_mut(peer_id).ok_or(PeerError::UnknownPeer(*peer_id))?;
            let was_connected = peer.status == PeerStatus::Connected;
            peer.status = PeerStatus::Disconnected;
            was_connected
        };

        if let Some(channel) = self.channels.lock().await.remove(peer_id) {
            if let Err(e) = self.transport.close(channel).await {
                debug!("Closing channel to {} failed: {}", peer_id, e);
            }
        }

        if was_connected {
            info!("Disconnected from peer {}", peer_id);
            let _ = self.events.send(PeerEvent::Disconnected(*peer_id));
        }
        Ok(())
    }

    /// Applies a bounded reputation update: the new score is
    /// `clamp(reputation + delta, 0, 1)`, so a single event can never flip
    /// a peer's standing to an extreme.
    pub async fn update_reputation(&self, peer_id: &PeerId, delta: f64) -> PeerResult<Score> {
        let reputation = {
            let mut peers = self.peers.write().await;
            let peer = peers.get_mut(peer_id).ok_or(PeerError::UnknownPeer(*peer_id))?;
            peer.reputation = peer.reputation.saturating_add(delta);
            peer.reputation
        };
        debug!("Reputation of {} now {}", peer_id, reputation);
        let _ = self.events.send(PeerEvent::ReputationChanged {
            peer_id: *peer_id,
            reputation,
        });
        Ok(reputation)
    }

    async fn mark_disconnected(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().await.get_mut(peer_id) {
            peer.status = PeerStatus::Disconnected;
        }
    }
}
