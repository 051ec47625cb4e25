//! Bookkeeping for one in-flight optimistic mutation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{MutationId, SubjectId};

/// Lifecycle of a [`PendingMutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Confirming request issued, no response yet.
    InFlight,
    /// Server confirmed the mutation.
    Confirmed,
    /// Request failed or timed out.
    Failed,
}

/// An optimistic change applied locally and awaiting confirmation.
///
/// At most one exists per subject. It is discarded as soon as the
/// response for its `mutation_id` has been handled.
#[derive(Debug, Clone, Serialize)]
pub struct PendingMutation<S> {
    /// Unique id of this attempt.
    pub mutation_id: MutationId,
    /// Subject the mutation targets.
    pub subject_id: SubjectId,
    /// State written to the snapshot immediately.
    pub optimistic_state: S,
    /// State to restore on failure.
    pub prior_state: S,
    /// Snapshot revision right after the optimistic write.
    pub applied_revision: u64,
    /// Current lifecycle status.
    pub status: MutationStatus,
    /// When the user triggered the action.
    pub started_at: DateTime<Utc>,
}

impl<S> PendingMutation<S> {
    /// Creates an in-flight mutation record.
    #[must_use]
    pub fn new(
        subject_id: SubjectId,
        optimistic_state: S,
        prior_state: S,
        applied_revision: u64,
    ) -> Self {
        Self {
            mutation_id: MutationId::new(),
            subject_id,
            optimistic_state,
            prior_state,
            applied_revision,
            status: MutationStatus::InFlight,
            started_at: Utc::now(),
        }
    }

    /// Returns `true` while the confirming request is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.status == MutationStatus::InFlight
    }
}
