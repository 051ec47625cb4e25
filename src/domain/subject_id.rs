//! Type-safe identifiers for tracked subjects and mutation attempts.
//!
//! [`SubjectId`] wraps the opaque server-side document id of an order or
//! post. [`MutationId`] is a newtype around [`uuid::Uuid`] (v4) so that a
//! mutation attempt cannot be confused with any other UUID.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a server-owned entity tracked by a view (order id, post id).
///
/// Server ids are opaque strings; numeric ids found in push payloads are
/// converted to their decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a `SubjectId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier of one optimistic mutation attempt.
///
/// Generated when the user triggers an action; a retry by the user is a
/// new attempt with a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(uuid::Uuid);

impl MutationId {
    /// Creates a new random `MutationId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for MutationId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}
