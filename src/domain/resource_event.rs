//! Push events and the candidates routed into arbitration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{MutationId, SubjectId, Version, Versioned};

/// Where a candidate snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mutation_id", rename_all = "snake_case")]
pub enum CandidateSource {
    /// Out-of-band push notification.
    Push,
    /// Periodic re-fetch.
    Poll,
    /// Server response to a mutation this client issued.
    MutationConfirm(MutationId),
}

impl CandidateSource {
    /// Returns the source as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Poll => "poll",
            Self::MutationConfirm(_) => "mutation_confirm",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state proposed for the displayed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<S> {
    /// Proposed state.
    pub state: S,
    /// Server version, or `None` under the logical-clock encoding.
    pub version: Option<Version>,
    /// Origin of the candidate.
    pub source: CandidateSource,
}

impl<S> Candidate<S> {
    /// Builds a candidate from a versioned server value.
    #[must_use]
    pub fn from_versioned(value: Versioned<S>, source: CandidateSource) -> Self {
        Self {
            state: value.state,
            version: value.version,
            source,
        }
    }
}

/// A push notification after normalization.
///
/// Carries no ordering, exactly-once, or delivery guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent<S> {
    /// Subject the event describes.
    pub subject_id: SubjectId,
    /// Producer-assigned event type (e.g. `"order_status_updated"`).
    pub event_type: String,
    /// Decoded state, with its server version if present.
    pub new_state: Versioned<S>,
    /// Local receipt time.
    pub received_at: DateTime<Utc>,
}

impl<S> ResourceEvent<S> {
    /// Converts the event into a push candidate.
    #[must_use]
    pub fn into_candidate(self) -> Candidate<S> {
        Candidate::from_versioned(self.new_state, CandidateSource::Push)
    }
}
