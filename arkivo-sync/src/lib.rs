//! Collection synchronization and conflict resolution for Arkivo.
//!
//! # Architecture
//!
//! Shared collections replicate across peers with no central authority.
//! Divergence is detected by content hash and lineage, and every conflict
//! flows through one pipeline:
//!
//! 1. **Detect**: the coordinator compares version summaries from
//!    connected peers against the local replica
//! 2. **Classify**: the resolver derives severity from divergence count,
//!    cultural implications, and author reputation spread
//! 3. **Resolve**: deterministic strategies apply directly; high-severity
//!    and culturally implicated conflicts go to a community vote or to
//!    community validators
//! 4. **Apply**: the winning version becomes the local replica and
//!    reputation feedback flows back to the peer registry
//!
//! Cultural-validation signals influence ranking and reporting only; they
//! never gate whether a collection can be read.
//!
//! # Example
//!
//! ```no_run
//! use arkivo_peer::{PeerConfig, PeerRegistry};
//! use arkivo_peer::transport::mock::MockTransport;
//! use arkivo_consensus::{ConsensusConfig, ConsensusEngine, CulturalValidationWorkflow, ValidationConfig};
//! use arkivo_sync::store::memory::MemoryCollectionStore;
//! use arkivo_sync::sync_transport::mock::MockSyncTransport;
//! use arkivo_sync::{ConflictResolver, SyncCoordinator, SyncSettings};
//! use std::sync::Arc;
//!
//! let settings = SyncSettings::default();
//! let registry = Arc::new(PeerRegistry::new(
//!     Arc::new(MockTransport::new()),
//!     PeerConfig::default(),
//! ));
//! let store = Arc::new(MemoryCollectionStore::new());
//! let consensus = Arc::new(ConsensusEngine::new(ConsensusConfig::default()));
//! let validation = Arc::new(CulturalValidationWorkflow::new(
//!     registry.clone(),
//!     ValidationConfig::default(),
//! ));
//! let resolver = Arc::new(ConflictResolver::new(
//!     store.clone(),
//!     registry.clone(),
//!     consensus,
//!     validation,
//!     &settings,
//! ));
//! let transport = Arc::new(MockSyncTransport::new(registry.local_peer()));
//! let coordinator = SyncCoordinator::new(registry, store, transport, resolver, settings);
//! # let _ = coordinator;
//! ```

mod config;
mod conflict;
mod coordinator;
mod error;
mod resolver;
pub mod protocol;
pub mod store;
pub mod sync_transport;

pub use config::{ResolverConfig, SyncSettings};
pub use conflict::{
    ConflictDetail, ConflictResolution, ResolutionStrategy, Severity, SyncConflict,
};
pub use coordinator::{
    CollectionSyncResult, CollectionSyncState, SyncCoordinator, SyncOutcome, SyncReport,
    SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use protocol::{
    ConflictProposalMessage, ErrorMessage, SummaryRequestMessage, SummaryResponseMessage,
    SyncMessage, ValidationRequestMessage, ValidationResponseMessage, VersionRequestMessage,
    VersionResponseMessage, VersionSummary, VoteCastMessage, PROTOCOL_VERSION,
};
pub use resolver::{ApplyOutcome, ConflictResolver, ResolutionOutcome};
pub use store::CollectionStore;
pub use sync_transport::SyncTransport;
