//! Peer-layer configuration.

use crate::error::{PeerError, PeerResult};
use arkivo_types::PeerId;
use std::time::Duration;

/// Configuration for the peer registry.
///
/// Supplied by the identity/config collaborator at startup; hot reload is
/// out of scope.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Our own peer identity.
    pub local_peer: PeerId,
    /// Maximum number of peers the registry will admit.
    pub max_peers: usize,
    /// Deadline for a single connect attempt across all known addresses.
    pub connect_timeout: Duration,
    /// Addresses dialed at startup to join the network.
    pub bootstrap_peers: Vec<String>,
}

impl PeerConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> PeerResult<()> {
        if self.max_peers == 0 {
            return Err(PeerError::InvalidConfig("max_peers must be at least 1".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(PeerError::InvalidConfig("connect_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            local_peer: PeerId::new(),
            max_peers: 32,
            connect_timeout: Duration::from_secs(10),
            bootstrap_peers: Vec::new(),
        }
    }
}
