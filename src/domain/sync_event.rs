//! UI-facing notifications emitted by open views.
//!
//! Every write to a displayed snapshot, every busy-state change and every
//! rejected mutation emits a [`SyncEvent`] through the
//! [`super::EventBus`]. Ignored candidates emit nothing, so a duplicate
//! push or poll never produces a second notification.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{MutationId, SubjectId, Version};
use crate::error::RollbackOutcome;

/// Why the displayed state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Local optimistic write for a user action.
    Optimistic,
    /// Accepted push notification.
    Push,
    /// Accepted poll result.
    Poll,
    /// Server confirmation that differed from the optimistic guess.
    MutationConfirm,
    /// Optimistic write undone after a failed mutation.
    Rollback,
}

/// Notification emitted after a view changes.
///
/// `state` payloads are carried as JSON so that the bus stays independent
/// of the subject type.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Emitted when a view finishes its initial fetch.
    SnapshotLoaded {
        /// Subject identifier.
        subject_id: SubjectId,
        /// Resource kind (e.g. `"order"`).
        kind: &'static str,
        /// Initial state.
        state: serde_json::Value,
        /// Initial version.
        version: Version,
        /// Load timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted whenever the displayed state changes.
    SnapshotUpdated {
        /// Subject identifier.
        subject_id: SubjectId,
        /// Resource kind.
        kind: &'static str,
        /// What caused the change.
        source: UpdateSource,
        /// New displayed state.
        state: serde_json::Value,
        /// Version after the change.
        version: Version,
        /// Change timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the triggering control must be disabled or re-enabled.
    ControlBusy {
        /// Subject identifier.
        subject_id: SubjectId,
        /// `true` while a mutation is in flight.
        busy: bool,
        /// Change timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the server confirms a mutation.
    MutationConfirmed {
        /// Subject identifier.
        subject_id: SubjectId,
        /// Confirmed attempt.
        mutation_id: MutationId,
        /// Whether the server value differed from the optimistic guess.
        corrected: bool,
        /// Confirmation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// User-visible failure notice for a mutation.
    MutationRejected {
        /// Subject identifier.
        subject_id: SubjectId,
        /// Failed attempt.
        mutation_id: MutationId,
        /// Whether the optimistic state was undone.
        rollback: RollbackOutcome,
        /// Failure description.
        reason: String,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted once when a view is torn down.
    ViewClosed {
        /// Subject identifier.
        subject_id: SubjectId,
        /// Teardown timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Returns the subject ID associated with this event.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        match self {
            Self::SnapshotLoaded { subject_id, .. }
            | Self::SnapshotUpdated { subject_id, .. }
            | Self::ControlBusy { subject_id, .. }
            | Self::MutationConfirmed { subject_id, .. }
            | Self::MutationRejected { subject_id, .. }
            | Self::ViewClosed { subject_id, .. } => subject_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::SnapshotLoaded { .. } => "snapshot_loaded",
            Self::SnapshotUpdated { .. } => "snapshot_updated",
            Self::ControlBusy { .. } => "control_busy",
            Self::MutationConfirmed { .. } => "mutation_confirmed",
            Self::MutationRejected { .. } => "mutation_rejected",
            Self::ViewClosed { .. } => "view_closed",
        }
    }

    /// Returns `true` for notices that must be surfaced to the user.
    #[must_use]
    pub const fn is_user_notice(&self) -> bool {
        matches!(self, Self::MutationRejected { .. })
    }
}
