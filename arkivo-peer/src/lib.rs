//! Peer membership, health, and transport contract for Arkivo.
//!
//! # Components
//!
//! - **Registry**: the single owner of the peer table — connection state,
//!   capability sets, and bounded reputation scores
//! - **Health**: aggregate network-quality metrics derived from registry
//!   snapshots
//! - **Transport**: the contract the byte-level wire layer implements,
//!   with an in-memory mock for tests
//!
//! The registry publishes connection events on a broadcast channel so that
//! the health monitor and the sync layer subscribe instead of polling.

mod config;
mod error;
mod health;
mod peer;
mod registry;
pub mod transport;

pub use config::PeerConfig;
pub use error::{PeerError, PeerResult};
pub use health::{NetworkHealth, NetworkHealthMonitor};
pub use peer::{Peer, PeerCapabilities, PeerFilter, PeerStatus};
pub use registry::{PeerEvent, PeerRegistry};
pub use transport::{Channel, Transport};
