//! Post like toggling: unversioned state on the local logical clock.
//!
//! The likes endpoints carry no version, so every accepted update advances
//! the snapshot's logical clock instead.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::backend::{ApiClient, ResourceBackend};
use crate::domain::{SubjectId, Versioned};
use crate::error::SyncError;

/// Like state of a post as seen by the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeState {
    /// Whether the current user likes the post.
    pub liked: bool,
    /// Total like count.
    pub count: u64,
}

impl LikeState {
    /// Creates a like state.
    #[must_use]
    pub const fn new(liked: bool, count: u64) -> Self {
        Self { liked, count }
    }
}

/// User intent on a post's like button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeChange {
    /// Flip the current state.
    Toggle,
    /// Like; invalid if already liked.
    Like,
    /// Unlike; invalid if not liked.
    Unlike,
}

/// Computes the optimistic like state for `change`.
///
/// # Errors
///
/// Returns [`SyncError::InvalidChange`] when liking an already-liked post
/// or unliking a post that is not liked.
pub fn project_like(current: &LikeState, change: &LikeChange) -> Result<LikeState, SyncError> {
    let like = match change {
        LikeChange::Toggle => !current.liked,
        LikeChange::Like if current.liked => {
            return Err(SyncError::InvalidChange("post already liked".to_string()));
        }
        LikeChange::Unlike if !current.liked => {
            return Err(SyncError::InvalidChange("post not liked".to_string()));
        }
        LikeChange::Like => true,
        LikeChange::Unlike => false,
    };
    let count = if like {
        current.count.saturating_add(1)
    } else {
        current.count.saturating_sub(1)
    };
    Ok(LikeState::new(like, count))
}

/// Like count as a number or as the list of liking user ids.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountWire {
    Number(u64),
    Users(Vec<serde_json::Value>),
}

impl CountWire {
    fn count(&self) -> u64 {
        match self {
            Self::Number(n) => *n,
            Self::Users(users) => u64::try_from(users.len()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LikeWire {
    #[serde(alias = "isLiked", alias = "is_liked")]
    liked: bool,
    #[serde(alias = "likes", alias = "likeCount", alias = "likesCount", alias = "like_count")]
    count: CountWire,
}

impl From<LikeWire> for LikeState {
    fn from(wire: LikeWire) -> Self {
        Self::new(wire.liked, wire.count.count())
    }
}

/// Decodes a like event body.
#[must_use]
pub fn decode_like(body: &serde_json::Value) -> Option<Versioned<LikeState>> {
    serde_json::from_value::<LikeWire>(body.clone())
        .ok()
        .map(|wire| Versioned::unversioned(wire.into()))
}

/// Like-toggle backend over the REST API.
#[derive(Debug, Clone)]
pub struct HttpLikeBackend {
    api: ApiClient,
}

impl HttpLikeBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResourceBackend for HttpLikeBackend {
    type State = LikeState;
    type Change = LikeChange;

    fn kind(&self) -> &'static str {
        "post_like"
    }

    fn subject_keys(&self) -> &'static [&'static str] {
        &["postId", "post_id", "subjectId", "_id", "id"]
    }

    fn project(&self, current: &LikeState, change: &LikeChange) -> Result<LikeState, SyncError> {
        project_like(current, change)
    }

    fn decode_event(&self, body: &serde_json::Value) -> Option<Versioned<LikeState>> {
        decode_like(body)
    }

    async fn fetch(&self, subject_id: &SubjectId) -> Result<Versioned<LikeState>, SyncError> {
        let wire: LikeWire = self.api.get_json(&format!("/posts/{subject_id}/likes")).await?;
        Ok(Versioned::unversioned(wire.into()))
    }

    async fn mutate(
        &self,
        subject_id: &SubjectId,
        change: &LikeChange,
    ) -> Result<Versioned<LikeState>, SyncError> {
        let (method, path) = match change {
            LikeChange::Toggle => (Method::POST, format!("/posts/{subject_id}/like/toggle")),
            LikeChange::Like => (Method::PUT, format!("/posts/{subject_id}/like")),
            LikeChange::Unlike => (Method::DELETE, format!("/posts/{subject_id}/like")),
        };
        let wire: LikeWire = self.api.send_json::<_, ()>(method, &path, None).await?;
        Ok(Versioned::unversioned(wire.into()))
    }
}
