//! Community voting and advisory cultural validation for Arkivo.
//!
//! Two components share this crate:
//!
//! - **ConsensusEngine**: topic-scoped votes used by the conflict resolver
//!   to break ties, and independently for cultural-policy questions. A
//!   topic is `Open` until its deadline or participation target closes it.
//! - **CulturalValidationWorkflow**: an advisory scoring process over a
//!   collection's cultural metadata. It produces scores and advisory text
//!   only — nothing in this crate makes, or implies, an access decision.

mod config;
mod engine;
mod error;
mod validation;

pub use config::{ConsensusConfig, ValidationConfig};
pub use engine::{ClosedConsensus, CommunityConsensus, ConsensusEngine, ConsensusResult};
pub use error::{ConsensusError, Result};
pub use validation::{
    CulturalValidationRequest, CulturalValidationWorkflow, ValidationAdvisory, ValidationKind,
    ValidationPriority, ValidationRecord,
};
