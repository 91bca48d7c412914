//! Peer records and capability sets.

use arkivo_types::{CollectionId, HybridTimestamp, PeerId, Score};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Connection state of a known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    /// Known but no channel is open.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// A channel is established.
    Connected,
}

/// What a peer offers to the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    /// Collections the peer advertises for sync.
    pub collections: HashSet<CollectionId>,
    /// Whether the peer accepts cultural-validation requests.
    pub validator: bool,
    /// Whether the peer relays traffic for otherwise unreachable peers.
    pub relay: bool,
}

impl PeerCapabilities {
    /// Capabilities advertising the given collections.
    #[must_use]
    pub fn advertising(collections: impl IntoIterator<Item = CollectionId>) -> Self {
        Self {
            collections: collections.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// A known peer.
///
/// Owned exclusively by the registry; all mutation goes through registry
/// operations so that state transitions and reputation bounds hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// The peer's network identity.
    pub id: PeerId,
    /// The peer's public key, as announced on handshake.
    pub public_key: String,
    /// Addresses the peer can be reached at, in preference order.
    pub addresses: Vec<String>,
    /// Current connection state.
    pub status: PeerStatus,
    /// Bounded trust score in `[0,1]`.
    pub reputation: Score,
    /// Cultural communities the peer identifies with.
    pub cultural_communities: Vec<String>,
    /// Advertised capabilities.
    pub capabilities: PeerCapabilities,
    /// Last time we heard from the peer.
    pub last_seen: HybridTimestamp,
}

impl Peer {
    /// Creates a new disconnected peer with a neutral reputation.
    #[must_use]
    pub fn new(id: PeerId, public_key: impl Into<String>) -> Self {
        Self {
            id,
            public_key: public_key.into(),
            addresses: Vec::new(),
            status: PeerStatus::Disconnected,
            reputation: Score::NEUTRAL,
            cultural_communities: Vec::new(),
            capabilities: PeerCapabilities::default(),
            last_seen: HybridTimestamp::now(),
        }
    }

    /// Adds an address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Sets the cultural communities.
    #[must_use]
    pub fn with_communities(mut self, communities: impl IntoIterator<Item = String>) -> Self {
        self.cultural_communities = communities.into_iter().collect();
        self
    }

    /// Sets the capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: PeerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// True if the peer advertises the given collection.
    #[must_use]
    pub fn advertises(&self, collection: &CollectionId) -> bool {
        self.capabilities.collections.contains(collection)
    }
}

/// Filter for registry listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PeerFilter {
    /// Every known peer.
    #[default]
    All,
    /// Peers in the given connection state.
    Status(PeerStatus),
    /// Peers that accept validation requests.
    Validators,
    /// Peers belonging to the given cultural community.
    Community(String),
}

impl PeerFilter {
    /// Whether a peer passes the filter.
    #[must_use]
    pub fn matches(&self, peer: &Peer) -> bool {
        match self {
            Self::All => true,
            Self::Status(status) => peer.status == *status,
            Self::Validators => peer.capabilities.validator,
            Self::Community(name) => peer.cultural_communities.iter().any(|c| c == name),
        }
    }
}
