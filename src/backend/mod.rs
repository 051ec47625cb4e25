//! Backend strategy: the per-feature configuration of the sync engine.
//!
//! A feature (order tracking, like toggling) is a [`ResourceBackend`]:
//! how to fetch a snapshot, how to issue a mutation, how to project a user
//! change onto the displayed state, and how to decode a push payload into
//! a versioned state. The engine itself is generic over this trait.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{SubjectId, Versioned};
use crate::error::SyncError;

pub use http::ApiClient;

/// Keys tried, in order, when locating a subject id in a push payload.
pub const DEFAULT_SUBJECT_KEYS: &[&str] = &["subjectId", "subject_id"];

/// Strategy seam between the generic engine and one resource type.
#[async_trait]
pub trait ResourceBackend: fmt::Debug + Send + Sync + 'static {
    /// Displayed state. Compared by value during arbitration.
    type State: Clone + PartialEq + fmt::Debug + Serialize + Send + Sync + 'static;

    /// User intent applied by a mutation.
    type Change: Clone + fmt::Debug + Send + Sync + 'static;

    /// Short resource name used in logs and notifications.
    fn kind(&self) -> &'static str;

    /// Payload keys that may carry the subject id, tried in order at the
    /// top level and then inside nested containers.
    fn subject_keys(&self) -> &'static [&'static str] {
        DEFAULT_SUBJECT_KEYS
    }

    /// Computes the optimistic state for `change` applied to `current`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidChange`] if the change cannot be derived
    /// from the current state.
    fn project(&self, current: &Self::State, change: &Self::Change)
    -> Result<Self::State, SyncError>;

    /// Returns `true` if moving from `current` to `candidate` goes against
    /// the resource's lifecycle. Consulted only for candidates without a
    /// server version, which cannot otherwise be ordered.
    fn regresses(&self, _current: &Self::State, _candidate: &Self::State) -> bool {
        false
    }

    /// Decodes the located body of a push event.
    ///
    /// Returns `None` when the body does not describe this resource.
    fn decode_event(&self, body: &serde_json::Value) -> Option<Versioned<Self::State>>;

    /// Fetches the current server state.
    ///
    /// # Errors
    ///
    /// Returns a transport or decode [`SyncError`] on failure.
    async fn fetch(&self, subject_id: &SubjectId) -> Result<Versioned<Self::State>, SyncError>;

    /// Issues the confirming request for `change` and returns the state the
    /// server computed.
    ///
    /// # Errors
    ///
    /// Returns a transport, status or decode [`SyncError`] on failure.
    async fn mutate(
        &self,
        subject_id: &SubjectId,
        change: &Self::Change,
    ) -> Result<Versioned<Self::State>, SyncError>;
}
