//! Voting and validation configuration.

use crate::error::{ConsensusError, Result};
use std::time::Duration;

/// Configuration for the consensus engine.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Vote share the leading option must exceed for approval.
    pub consensus_threshold: f64,
    /// If the runner-up is within this margin of an approved leader, the
    /// outcome is `Modified` rather than `Approved`.
    pub modified_margin: f64,
    /// Number of ballots that closes a topic early. Zero disables early
    /// closure; the topic then closes at its deadline.
    pub participation_target: usize,
    /// How long a topic stays open absent early closure.
    pub vote_window: Duration,
}

impl ConsensusConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.consensus_threshold) || self.consensus_threshold == 0.0 {
            return Err(ConsensusError::InvalidConfig(
                "consensus_threshold must be in (0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.modified_margin) {
            return Err(ConsensusError::InvalidConfig(
                "modified_margin must be in [0, 1)".into(),
            ));
        }
        if self.vote_window.is_zero() {
            return Err(ConsensusError::InvalidConfig(
                "vote_window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.6,
            modified_margin: 0.1,
            participation_target: 0,
            vote_window: Duration::from_secs(600),
        }
    }
}

/// Configuration for the cultural-validation workflow.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Weighted consensus at or above which a version reads as approved.
    pub approve_threshold: f64,
    /// Weighted consensus at or below which a version reads as rejected.
    pub reject_threshold: f64,
    /// Score spread between validators beyond which the outcome is
    /// disputed regardless of the mean.
    pub dispute_spread: f64,
}

impl ValidationConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.reject_threshold >= self.approve_threshold {
            return Err(ConsensusError::InvalidConfig(
                "reject_threshold must be below approve_threshold".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            approve_threshold: 0.7,
            reject_threshold: 0.3,
            dispute_spread: 0.4,
        }
    }
}
