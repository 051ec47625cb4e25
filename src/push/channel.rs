//! Push-channel contract consumed by the engine.
//!
//! A [`PushChannel`] delivers raw JSON payloads to subscribers at
//! unpredictable times and may stop delivering without notice. The engine
//! never waits on it; silence is covered by polling.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::SubjectId;

/// Callback invoked with each raw push payload.
pub type EventCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Opaque handle returned by [`PushChannel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// What a subscription asks the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SubjectFilter {
    /// Events about one entity.
    Subject(SubjectId),
    /// Events about every entity owned by a user.
    Owner(String),
    /// Every event on the channel.
    All,
}

impl SubjectFilter {
    /// Returns `true` if a subscription with this filter receives events
    /// published on `topic`.
    #[must_use]
    pub fn matches(&self, topic: &Self) -> bool {
        matches!(self, Self::All) || self == topic
    }

    /// Room name used on the wire (`subject:<id>`, `owner:<id>`, `*`).
    #[must_use]
    pub fn topic(&self) -> String {
        match self {
            Self::Subject(id) => format!("subject:{id}"),
            Self::Owner(owner) => format!("owner:{owner}"),
            Self::All => "*".to_string(),
        }
    }
}

impl fmt::Display for SubjectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic())
    }
}

/// Persistent subscription transport.
///
/// `unsubscribe` must be synchronous: once it returns, the callback is no
/// longer reachable from the channel.
pub trait PushChannel: fmt::Debug + Send + Sync {
    /// Registers `on_event` for payloads matching `filter`.
    fn subscribe(&self, filter: SubjectFilter, on_event: EventCallback) -> SubscriptionHandle;

    /// Removes a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
