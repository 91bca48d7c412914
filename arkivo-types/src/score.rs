//! Bounded unit-interval scores.
//!
//! Reputation, confidence, community support, and consensus values all live
//! in `[0,1]`. `Score` keeps that invariant at the type level: every
//! constructor clamps, and additive updates saturate at the bounds rather
//! than wrapping or resetting to an extreme.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value clamped to the closed interval `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    /// The lowest possible score.
    pub const MIN: Score = Score(0.0);
    /// The highest possible score.
    pub const MAX: Score = Score(1.0);
    /// The neutral midpoint, used as the starting reputation for new peers.
    pub const NEUTRAL: Score = Score(0.5);

    /// Creates a score, clamping the input into `[0,1]`.
    /// NaN clamps to the lower bound.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Returns the inner value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }

    /// Applies a delta, saturating at the interval bounds. A single update
    /// can therefore never flip a score to an extreme it was not already
    /// adjacent to.
    #[must_use]
    pub fn saturating_add(&self, delta: f64) -> Self {
        Self::new(self.0 + delta)
    }

    /// Absolute distance to another score.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.0 - other.0).abs()
    }

    /// Returns the greater of two scores.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 { other } else { self }
    }

    /// Returns the lesser of two scores.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if other.0 < self.0 { other } else { self }
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}
