//! The versioned local copy of one server-owned aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{SubjectId, Version};

/// State paired with the version the server attached to it, if any.
///
/// Returned by every fetch, mutate and event decode. `version == None`
/// selects the local logical clock for that candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Versioned<S> {
    /// Domain state payload.
    pub state: S,
    /// Server-issued version, if the endpoint provides one.
    pub version: Option<Version>,
}

impl<S> Versioned<S> {
    /// State with a server-issued version.
    #[must_use]
    pub const fn new(state: S, version: Version) -> Self {
        Self {
            state,
            version: Some(version),
        }
    }

    /// State without a server version.
    #[must_use]
    pub const fn unversioned(state: S) -> Self {
        Self {
            state,
            version: None,
        }
    }
}

/// Locally displayed copy of one subject's server state.
///
/// Created on first fetch, written only through the view's accept,
/// optimistic-apply and rollback paths, dropped when the view closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot<S> {
    /// Identity of the tracked entity.
    pub subject_id: SubjectId,
    /// Displayed state.
    pub state: S,
    /// Version of the last accepted server state.
    pub version: Version,
    /// Local write counter, bumped by every write to this snapshot.
    pub revision: u64,
    /// Local time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl<S> ResourceSnapshot<S> {
    /// Creates the snapshot from the initial fetch.
    #[must_use]
    pub fn new(subject_id: SubjectId, initial: Versioned<S>) -> Self {
        Self {
            subject_id,
            state: initial.state,
            version: initial.version.unwrap_or(Version::ZERO),
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// Replaces state and version.
    ///
    /// The version never moves backwards; a lower value is clamped to the
    /// current one.
    pub(crate) fn replace(&mut self, state: S, version: Version) {
        self.state = state;
        self.version = self.version.max(version);
        self.touch();
    }

    /// Replaces state only (optimistic apply and rollback).
    pub(crate) fn overwrite_state(&mut self, state: S) {
        self.state = state;
        self.touch();
    }

    fn touch(&mut self) {
        self.revision = self.revision.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unversioned_initial_load_starts_at_zero() {
        let snap = ResourceSnapshot::new(SubjectId::from("p"), Versioned::unversioned(3_u32));
        assert_eq!(snap.version, Version::ZERO);
        assert_eq!(snap.revision, 0);
    }

    #[test]
    fn replace_never_lowers_version() {
        let mut snap = ResourceSnapshot::new(SubjectId::from("o"), Versioned::new(1_u32, Version::new(5)));
        snap.replace(2, Version::new(3));
        assert_eq!(snap.state, 2);
        assert_eq!(snap.version, Version::new(5));
        assert_eq!(snap.revision, 1);
    }

    #[test]
    fn overwrite_bumps_revision_but_keeps_version() {
        let mut snap = ResourceSnapshot::new(SubjectId::from("o"), Versioned::new(1_u32, Version::new(5)));
        snap.overwrite_state(9);
        assert_eq!(snap.version, Version::new(5));
        assert_eq!(snap.revision, 1);
    }
}
