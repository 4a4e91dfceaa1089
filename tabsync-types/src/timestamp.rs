//! Wall-clock timestamps for tab and snapshot state.
//!
//! Tab conflict windows are defined in milliseconds (concurrent-edit
//! window, staleness horizon), so timestamps are plain epoch milliseconds
//! rather than a logical clock. Ordering is total and serialization is
//! transparent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one second.
pub const SECOND_MS: u64 = 1_000;
/// Milliseconds in one minute.
pub const MINUTE_MS: u64 = 60 * SECOND_MS;
/// Milliseconds in one hour.
pub const HOUR_MS: u64 = 60 * MINUTE_MS;
/// Milliseconds in one day.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// A point in time, in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp, used as "never synced".
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp at the current time.
    #[must_use]
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64;
        Self(ms)
    }

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns the epoch milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns true if this is the zero timestamp.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Absolute difference between two timestamps, in milliseconds.
    #[must_use]
    pub const fn delta_ms(&self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Milliseconds elapsed from this timestamp to `now`.
    /// Zero if this timestamp is in the future of `now`.
    #[must_use]
    pub const fn age_from(&self, now: Self) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Returns this timestamp advanced by the given milliseconds.
    #[must_use]
    pub const fn plus_millis(&self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    /// Saturating difference in milliseconds.
    fn sub(self, rhs: Self) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
