//! Open views: one displayed snapshot per subject and its feeds.
//!
//! A [`SubjectView`] owns everything that keeps one snapshot current: the
//! push subscription, the polling fallback and the [`ViewShared`] state
//! those feeds write into. Every write goes through
//! [`ViewShared::offer`] (or the mutator), under the slot lock, after an
//! aliveness check. Teardown clears the flag under the same lock, so no
//! callback, tick or response that arrives later can write or notify.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::mutator::{MutationOutcome, OptimisticMutator};
use super::polling::PollingFallback;
use super::registry::ViewRegistry;
use crate::backend::ResourceBackend;
use crate::domain::{
    Candidate, CandidateSource, EventBus, PendingMutation, ResourceEvent, ResourceSnapshot,
    SubjectId, SyncEvent, UpdateSource, Version,
};
use crate::error::SyncError;
use crate::push::{PushChannel, SubscriptionHandle, normalize};
use crate::reconcile::{IgnoreReason, ReconciliationPolicy, Verdict};

/// Mutable state of one view, guarded by a single lock.
#[derive(Debug)]
pub(crate) struct Slot<S> {
    pub(crate) snapshot: ResourceSnapshot<S>,
    pub(crate) pending: Option<PendingMutation<S>>,
    pub(crate) last_push_at: Option<DateTime<Utc>>,
}

/// State shared between a view, its mutators and its feed callbacks.
#[derive(Debug)]
pub(crate) struct ViewShared<B: ResourceBackend> {
    subject_id: SubjectId,
    backend: Arc<B>,
    bus: EventBus,
    policy: ReconciliationPolicy,
    mutation_timeout: Duration,
    slot: Mutex<Slot<B::State>>,
    alive: AtomicBool,
}

impl<B: ResourceBackend> ViewShared<B> {
    pub(crate) fn new(
        snapshot: ResourceSnapshot<B::State>,
        backend: Arc<B>,
        bus: EventBus,
        policy: ReconciliationPolicy,
        mutation_timeout: Duration,
    ) -> Self {
        Self {
            subject_id: snapshot.subject_id.clone(),
            backend,
            bus,
            policy,
            mutation_timeout,
            slot: Mutex::new(Slot {
                snapshot,
                pending: None,
                last_push_at: None,
            }),
            alive: AtomicBool::new(true),
        }
    }

    pub(crate) const fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub(crate) fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub(crate) const fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    pub(crate) const fn mutation_timeout(&self) -> Duration {
        self.mutation_timeout
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Slot<B::State>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Readers must hold the slot lock for the answer to stay valid until
    /// their write.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the view dead. Returns `false` if it already was.
    pub(crate) fn shut(&self) -> bool {
        let _slot = self.lock();
        self.alive.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn snapshot(&self) -> ResourceSnapshot<B::State> {
        self.lock().snapshot.clone()
    }

    pub(crate) fn publish(&self, event: SyncEvent) {
        self.bus.publish(event);
    }

    pub(crate) fn publish_busy(&self, busy: bool) {
        self.publish(SyncEvent::ControlBusy {
            subject_id: self.subject_id.clone(),
            busy,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn publish_update(&self, source: UpdateSource, snapshot: &ResourceSnapshot<B::State>) {
        self.publish(SyncEvent::SnapshotUpdated {
            subject_id: self.subject_id.clone(),
            kind: self.backend.kind(),
            source,
            state: serde_json::to_value(&snapshot.state).unwrap_or_default(),
            version: snapshot.version,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn publish_loaded(&self) {
        let slot = self.lock();
        self.publish(SyncEvent::SnapshotLoaded {
            subject_id: self.subject_id.clone(),
            kind: self.backend.kind(),
            state: serde_json::to_value(&slot.snapshot.state).unwrap_or_default(),
            version: slot.snapshot.version,
            timestamp: Utc::now(),
        });
    }

    /// Arbitrates a push or poll candidate and applies it when accepted.
    ///
    /// A poll result identical to the displayed state is dropped before
    /// arbitration: polls are the noisy feed and must not move the logical
    /// clock. An unversioned candidate the backend reports as a lifecycle
    /// regression is dropped as well.
    pub(crate) fn offer(&self, candidate: Candidate<B::State>) -> Verdict {
        let mut slot = self.lock();
        if !self.is_alive() {
            tracing::trace!(subject_id = %self.subject_id, source = %candidate.source, "candidate after teardown dropped");
            return Verdict::Ignore(IgnoreReason::ViewClosed);
        }
        let source = candidate.source;
        if source == CandidateSource::Push {
            slot.last_push_at = Some(Utc::now());
        }
        if source == CandidateSource::Poll && candidate.state == slot.snapshot.state {
            return Verdict::Ignore(IgnoreReason::Unchanged);
        }
        if candidate.version.is_none() && self.backend.regresses(&slot.snapshot.state, &candidate.state)
        {
            tracing::debug!(subject_id = %self.subject_id, %source, "unversioned backward move refused");
            return Verdict::Ignore(IgnoreReason::Regression);
        }

        let verdict = self
            .policy
            .arbitrate(&slot.snapshot, &candidate, slot.pending.as_ref());
        match verdict {
            Verdict::Accept { version } => {
                let changed = candidate.state != slot.snapshot.state;
                slot.snapshot.replace(candidate.state, version);
                if changed {
                    self.publish_update(update_source(source), &slot.snapshot);
                }
                tracing::debug!(
                    subject_id = %self.subject_id,
                    %source,
                    %version,
                    changed,
                    "candidate accepted"
                );
            }
            Verdict::Ignore(reason) => {
                tracing::debug!(subject_id = %self.subject_id, %source, %reason, "candidate ignored");
            }
        }
        verdict
    }

    /// Handles one raw push payload.
    ///
    /// Returns `None` when the payload is not about this subject or cannot
    /// be decoded as this resource.
    pub(crate) fn handle_push(&self, raw: &serde_json::Value) -> Option<Verdict> {
        let Some(normalized) = normalize(raw, self.backend.subject_keys()) else {
            tracing::debug!(subject_id = %self.subject_id, "push payload without subject id");
            return None;
        };
        if normalized.subject_id != self.subject_id {
            return None;
        }
        let Some(new_state) = self.backend.decode_event(&normalized.body) else {
            tracing::debug!(
                subject_id = %self.subject_id,
                event_type = %normalized.event_type,
                "push payload not decodable"
            );
            return None;
        };
        let event = ResourceEvent {
            subject_id: normalized.subject_id,
            event_type: normalized.event_type,
            new_state,
            received_at: Utc::now(),
        };
        tracing::trace!(
            subject_id = %event.subject_id,
            event_type = %event.event_type,
            received_at = %event.received_at,
            "push event received"
        );
        Some(self.offer(event.into_candidate()))
    }
}

const fn update_source(source: CandidateSource) -> UpdateSource {
    match source {
        CandidateSource::Push => UpdateSource::Push,
        CandidateSource::Poll => UpdateSource::Poll,
        CandidateSource::MutationConfirm(_) => UpdateSource::MutationConfirm,
    }
}

/// A displayed subject with live push and poll feeds.
///
/// Dropping the view tears it down; [`SubjectView::close`] does the same
/// explicitly.
#[derive(Debug)]
pub struct SubjectView<B: ResourceBackend> {
    shared: Arc<ViewShared<B>>,
    push: Arc<dyn PushChannel>,
    subscription: Option<SubscriptionHandle>,
    poller: PollingFallback,
    registry: Arc<ViewRegistry<B>>,
}

impl<B: ResourceBackend> SubjectView<B> {
    pub(crate) fn new(
        shared: Arc<ViewShared<B>>,
        push: Arc<dyn PushChannel>,
        registry: Arc<ViewRegistry<B>>,
    ) -> Self {
        Self {
            shared,
            push,
            subscription: None,
            poller: PollingFallback::new(),
            registry,
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<ViewShared<B>> {
        &self.shared
    }

    pub(crate) fn set_subscription(&mut self, handle: SubscriptionHandle) {
        self.subscription = Some(handle);
    }

    pub(crate) fn poller_mut(&mut self) -> &mut PollingFallback {
        &mut self.poller
    }

    /// Subject shown by this view.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        self.shared.subject_id()
    }

    /// Copy of the displayed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ResourceSnapshot<B::State> {
        self.shared.snapshot()
    }

    /// Copy of the displayed state.
    #[must_use]
    pub fn state(&self) -> B::State {
        self.shared.lock().snapshot.state.clone()
    }

    /// Version of the displayed state.
    #[must_use]
    pub fn version(&self) -> Version {
        self.shared.lock().snapshot.version
    }

    /// Returns `true` while a mutation is in flight; the triggering control
    /// should be disabled.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    /// When the last push payload for this subject was processed.
    #[must_use]
    pub fn last_push_at(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().last_push_at
    }

    /// Returns `true` until the view is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_alive()
    }

    /// Returns `true` while the polling fallback is scheduled.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Returns a mutator bound to this view.
    #[must_use]
    pub fn mutator(&self) -> OptimisticMutator<B> {
        OptimisticMutator::new(Arc::clone(&self.shared))
    }

    /// Applies `change` optimistically and confirms it with the server.
    ///
    /// # Errors
    ///
    /// See [`OptimisticMutator::perform`].
    pub async fn perform(&self, change: B::Change) -> Result<MutationOutcome<B::State>, SyncError> {
        self.mutator().perform(change).await
    }

    /// Fetches the server state now and offers it like a poll result.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; unlike scheduled polls, a manual refresh
    /// reports its failure.
    pub async fn refresh(&self) -> Result<Verdict, SyncError> {
        let fetched = self.shared.backend().fetch(self.subject_id()).await?;
        Ok(self
            .shared
            .offer(Candidate::from_versioned(fetched, CandidateSource::Poll)))
    }

    /// Tears the view down: no later push, poll or mutation response
    /// writes to it.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.shared.shut() {
            return;
        }
        if let Some(handle) = self.subscription.take() {
            self.push.unsubscribe(handle);
        }
        self.poller.stop();
        self.registry.remove(&self.shared);
        self.shared.publish(SyncEvent::ViewClosed {
            subject_id: self.shared.subject_id().clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(subject_id = %self.shared.subject_id(), "view closed");
    }
}

impl<B: ResourceBackend> Drop for SubjectView<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
