//! Sync-layer configuration.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Tunable thresholds for conflict classification and resolution.
///
/// The defaults mirror long-standing heuristics; they are configuration,
/// not law, so operators can adjust them per network.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Independent divergent versions at or above which a conflict is
    /// critical.
    pub critical_divergence: usize,
    /// Community support below which a culturally implicated version
    /// counts as contested.
    pub contested_support: f64,
    /// Reputation spread among remote authors beyond which a conflict is
    /// bumped to high severity.
    pub reputation_spread: f64,
    /// Reputation delta applied to the author of an accepted version.
    pub accept_delta: f64,
    /// Reputation delta applied to authors of rejected versions.
    pub reject_delta: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            critical_divergence: 3,
            contested_support: 0.5,
            reputation_spread: 0.5,
            accept_delta: 0.05,
            reject_delta: -0.02,
        }
    }
}

/// Configuration for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// How often the scheduled sync pass runs.
    pub sync_interval: Duration,
    /// Bound on concurrently syncing collections.
    pub max_concurrent_syncs: usize,
    /// Attempts per peer for summary and version fetches.
    pub retry_max_attempts: usize,
    /// First backoff delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// How long an escalated resolution waits for a community decision
    /// before leaving the conflict pending.
    pub conflict_resolution_timeout: Duration,
    /// Classification and resolution thresholds.
    pub resolver: ResolverConfig,
}

impl SyncSettings {
    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_concurrent_syncs == 0 {
            return Err(SyncError::InvalidConfig(
                "max_concurrent_syncs must be at least 1".into(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "retry_max_attempts must be at least 1".into(),
            ));
        }
        if self.resolver.critical_divergence < 2 {
            return Err(SyncError::InvalidConfig(
                "critical_divergence must be at least 2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.resolver.contested_support) {
            return Err(SyncError::InvalidConfig(
                "contested_support must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            max_concurrent_syncs: 4,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(250),
            conflict_resolution_timeout: Duration::from_secs(30),
            resolver: ResolverConfig::default(),
        }
    }
}
