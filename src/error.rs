//! Engine error types with numeric code mapping.
//!
//! [`SyncError`] is the central error type of the crate. Only
//! [`SyncError::MutationRejected`] is meant to reach the user; every other
//! variant is either a caller mistake or a transport failure that the
//! engine recovers from locally (poll failures are logged and skipped).

use std::time::Duration;

use serde::Serialize;

use crate::domain::{MutationId, SubjectId};

/// What happened to the optimistic state after a failed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The snapshot was restored to the pre-mutation state.
    RolledBack,
    /// A newer external update was accepted while the request was in
    /// flight; that state was left standing.
    Suppressed,
}

/// Engine error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category     |
/// |-----------|--------------|
/// | 1000–1999 | Usage        |
/// | 2000–2999 | View state   |
/// | 3000–3999 | Transport    |
/// | 4000–4999 | Mutation     |
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A mutation is already in flight for this subject.
    #[error("mutation already in flight for {0}")]
    Busy(SubjectId),

    /// The requested change cannot be derived from the current state.
    #[error("invalid change: {0}")]
    InvalidChange(String),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No open view for the subject.
    #[error("no open view for {0}")]
    NotOpen(SubjectId),

    /// A view for the subject is already open.
    #[error("view already open for {0}")]
    AlreadyOpen(SubjectId),

    /// The view was torn down before the operation completed.
    #[error("view closed for {0}")]
    ViewClosed(SubjectId),

    /// Request did not complete within the configured bound.
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// HTTP client failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("server returned status {0}")]
    Status(u16),

    /// Response or event payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Push channel failure (connect, send).
    #[error("push channel error: {0}")]
    Push(String),

    /// The confirming request for an optimistic mutation failed.
    #[error("mutation {mutation_id} on {subject_id} rejected: {reason}")]
    MutationRejected {
        /// Subject the mutation targeted.
        subject_id: SubjectId,
        /// The failed mutation attempt.
        mutation_id: MutationId,
        /// Whether the optimistic state was rolled back.
        rollback: RollbackOutcome,
        /// Underlying failure, rendered for display.
        reason: String,
    },

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Busy(_) => 1001,
            Self::InvalidChange(_) => 1002,
            Self::InvalidConfig(_) => 1003,
            Self::NotOpen(_) => 2001,
            Self::AlreadyOpen(_) => 2002,
            Self::ViewClosed(_) => 2003,
            Self::Timeout(_) => 3001,
            Self::Http(_) => 3002,
            Self::Status(_) => 3003,
            Self::Decode(_) => 3004,
            Self::Push(_) => 3005,
            Self::Internal(_) => 3000,
            Self::MutationRejected { .. } => 4001,
        }
    }

    /// Returns `true` if the error should be shown to the user.
    ///
    /// Channel and poll failures are recovered locally; a rejected
    /// mutation is the only failure the user must learn about.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(self, Self::MutationRejected { .. })
    }
}
