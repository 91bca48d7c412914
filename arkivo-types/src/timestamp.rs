//! Hybrid Logical Clock timestamps.
//!
//! Combines wall-clock milliseconds with a logical counter so that
//! timestamps are monotonic on a single peer and respect causality across
//! peers that exchange messages, while staying close to physical time.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A Hybrid Logical Clock timestamp.
///
/// `wall` is milliseconds since the Unix epoch; `logical` breaks ties
/// between events stamped within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    /// Physical component (milliseconds since Unix epoch).
    wall: u64,
    /// Logical counter for events at the same wall time.
    logical: u32,
}

impl HybridTimestamp {
    /// Creates a timestamp at the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall: wall_now_ms(),
            logical: 0,
        }
    }

    /// Creates a timestamp from components.
    #[must_use]
    pub const fn new(wall: u64, logical: u32) -> Self {
        Self { wall, logical }
    }

    /// Returns the wall-clock component.
    #[must_use]
    pub const fn wall(&self) -> u64 {
        self.wall
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Generates the next local timestamp, preserving monotonicity even if
    /// the wall clock stalls or steps backwards.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = wall_now_ms();
        if now > self.wall {
            Self { wall: now, logical: 0 }
        } else {
            Self {
                wall: self.wall,
                logical: self.logical.saturating_add(1),
            }
        }
    }

    /// Merges a timestamp received from another peer, producing a timestamp
    /// strictly greater than both the local clock and the received one.
    #[must_use]
    pub fn observe(&self, remote: &Self) -> Self {
        let now = wall_now_ms();
        let wall = now.max(self.wall).max(remote.wall);

        let logical = if wall == self.wall && wall == remote.wall {
            self.logical.max(remote.logical).saturating_add(1)
        } else if wall == self.wall {
            self.logical.saturating_add(1)
        } else if wall == remote.wall {
            remote.logical.saturating_add(1)
        } else {
            0
        };

        Self { wall, logical }
    }

    /// Returns a timestamp `duration` later on the wall component.
    /// Used to derive deadlines from the current clock.
    #[must_use]
    pub fn plus(&self, duration: Duration) -> Self {
        Self {
            wall: self.wall.saturating_add(duration.as_millis() as u64),
            logical: self.logical,
        }
    }

    /// Returns true if this timestamp is strictly before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }

    /// Returns true if this timestamp is strictly after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

fn wall_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as u64
}

impl Default for HybridTimestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall.cmp(&other.wall) {
            Ordering::Equal => self.logical.cmp(&other.logical),
            other => other,
        }
    }
}
