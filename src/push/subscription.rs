//! Per-channel subscription table.
//!
//! Tracks which callbacks are registered under which filter and provides
//! topic matching for adapters that scope delivery themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::channel::{EventCallback, SubjectFilter, SubscriptionHandle};

struct Entry {
    filter: SubjectFilter,
    callback: EventCallback,
}

/// Manages the set of live subscriptions for one push channel.
#[derive(Default)]
pub struct SubscriptionManager {
    entries: BTreeMap<SubscriptionHandle, Entry>,
    next_handle: u64,
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("count", &self.entries.len())
            .field("next_handle", &self.next_handle)
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Creates an empty subscription table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns its handle.
    pub fn insert(&mut self, filter: SubjectFilter, callback: EventCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.entries.insert(handle, Entry { filter, callback });
        handle
    }

    /// Removes a subscription, returning its filter if it existed.
    pub fn remove(&mut self, handle: SubscriptionHandle) -> Option<SubjectFilter> {
        self.entries.remove(&handle).map(|entry| entry.filter)
    }

    /// Returns the callbacks whose filter matches `topic`.
    #[must_use]
    pub fn matching(&self, topic: &SubjectFilter) -> Vec<EventCallback> {
        self.entries
            .values()
            .filter(|entry| entry.filter.matches(topic))
            .map(|entry| Arc::clone(&entry.callback))
            .collect()
    }

    /// Returns every registered callback.
    #[must_use]
    pub fn callbacks(&self) -> Vec<EventCallback> {
        self.entries
            .values()
            .map(|entry| Arc::clone(&entry.callback))
            .collect()
    }

    /// Returns the distinct filters currently subscribed, for re-subscribing
    /// after a reconnect.
    #[must_use]
    pub fn topics(&self) -> BTreeSet<String> {
        self.entries.values().map(|entry| entry.filter.topic()).collect()
    }

    /// Returns `true` if another live subscription still uses `filter`.
    #[must_use]
    pub fn has_filter(&self, filter: &SubjectFilter) -> bool {
        self.entries.values().any(|entry| &entry.filter == filter)
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no live subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
