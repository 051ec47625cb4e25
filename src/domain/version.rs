//! Monotonic version marker for snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Non-decreasing version of a [`super::ResourceSnapshot`].
///
/// Either server-issued (a sequence number or an `updatedAt` timestamp in
/// epoch millis) or a local logical clock advanced on every accepted
/// update when the server provides none.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of a snapshot nothing has been accepted into yet.
    pub const ZERO: Self = Self(0);

    /// Creates a version from a raw sequence value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Creates a version from a server timestamp (epoch millis).
    ///
    /// Timestamps before the epoch clamp to [`Version::ZERO`].
    #[must_use]
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(u64::try_from(at.timestamp_millis()).unwrap_or(0))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next logical-clock tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
