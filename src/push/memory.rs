//! In-process push channel.
//!
//! [`InMemoryPushChannel`] fans payloads out to subscribers whose filter
//! matches the published topic. Delivery is synchronous on the publishing
//! task. Useful for tests and for embedders that already own a transport
//! and only need to hand payloads to the engine.
//!
//! ## Limitations
//!
//! - Single-process only.
//! - No buffering: a payload published with no matching subscriber is lost,
//!   exactly as with a silent network channel.

use std::sync::{Mutex, PoisonError};

use super::channel::{EventCallback, PushChannel, SubjectFilter, SubscriptionHandle};
use super::subscription::SubscriptionManager;

/// In-memory fan-out push channel.
#[derive(Debug, Default)]
pub struct InMemoryPushChannel {
    subscriptions: Mutex<SubscriptionManager>,
}

impl InMemoryPushChannel {
    /// Creates a channel with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `payload` to every subscriber matching `topic`.
    ///
    /// Returns the number of callbacks invoked. Callbacks run after the
    /// subscription lock is released, so they may (un)subscribe freely.
    pub fn publish(&self, topic: &SubjectFilter, payload: &serde_json::Value) -> usize {
        let callbacks = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .matching(topic);
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
    }
}

impl PushChannel for InMemoryPushChannel {
    fn subscribe(&self, filter: SubjectFilter, on_event: EventCallback) -> SubscriptionHandle {
        let handle = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(filter.clone(), on_event);
        tracing::debug!(%filter, handle = handle.get(), "push subscription added");
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let removed = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle);
        if let Some(filter) = removed {
            tracing::debug!(%filter, handle = handle.get(), "push subscription removed");
        }
    }
}
