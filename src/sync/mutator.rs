//! Optimistic mutations.
//!
//! [`OptimisticMutator::perform`] writes the projected state to the view
//! before the confirming request is sent, then settles the outcome:
//!
//! - **success**: the server's state is arbitrated as the confirmation of
//!   this mutation and replaces the optimistic guess, unless a newer
//!   version reached the snapshot while the request ran;
//! - **failure**: the prior state is restored, unless any write reached the
//!   snapshot after the optimistic one, in which case that newer state
//!   stands and only the rejection is reported.
//!
//! At most one mutation is in flight per subject. A second `perform`
//! while one is pending fails with [`SyncError::Busy`] and sends nothing.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::view::ViewShared;
use crate::backend::ResourceBackend;
use crate::domain::{
    Candidate, CandidateSource, MutationId, MutationStatus, PendingMutation, SubjectId,
    SyncEvent, UpdateSource, Versioned,
};
use crate::error::{RollbackOutcome, SyncError};
use crate::reconcile::Verdict;

/// Result of a confirmed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome<S> {
    /// The settled mutation attempt.
    pub mutation_id: MutationId,
    /// State displayed after settlement. Differs from the server's answer
    /// when a newer version was displayed while the request ran.
    pub state: S,
    /// `true` when the server's answer differed from the optimistic guess.
    pub corrected: bool,
}

/// Performs optimistic mutations against one open view.
#[derive(Debug)]
pub struct OptimisticMutator<B: ResourceBackend> {
    shared: Arc<ViewShared<B>>,
}

impl<B: ResourceBackend> Clone for OptimisticMutator<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: ResourceBackend> OptimisticMutator<B> {
    pub(crate) const fn new(shared: Arc<ViewShared<B>>) -> Self {
        Self { shared }
    }

    /// Subject this mutator writes to.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        self.shared.subject_id()
    }

    /// Applies `change` optimistically and confirms it with the server.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Busy`] if a mutation is already pending; nothing is
    ///   written or sent.
    /// - [`SyncError::InvalidChange`] if the change does not apply to the
    ///   displayed state; nothing is written or sent.
    /// - [`SyncError::ViewClosed`] if the view was torn down before or
    ///   while the request ran; a late response writes nothing.
    /// - [`SyncError::MutationRejected`] if the request failed or timed out.
    pub async fn perform(&self, change: B::Change) -> Result<MutationOutcome<B::State>, SyncError> {
        let mutation_id = self.begin(&change)?;
        let mut settle = SettleGuard {
            mutator: self,
            mutation_id,
            armed: true,
        };

        let shared = &self.shared;
        let timeout = shared.mutation_timeout();
        let response = match tokio::time::timeout(
            timeout,
            shared.backend().mutate(shared.subject_id(), &change),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => Err(SyncError::Timeout(timeout)),
        };

        settle.armed = false;
        match response {
            Ok(confirmed) => self.confirm(mutation_id, confirmed),
            Err(err) => Err(self.fail(mutation_id, &err.to_string())),
        }
    }

    fn begin(&self, change: &B::Change) -> Result<MutationId, SyncError> {
        let shared = &self.shared;
        let subject_id = shared.subject_id();
        let mut slot = shared.lock();
        if !shared.is_alive() {
            return Err(SyncError::ViewClosed(subject_id.clone()));
        }
        if let Some(pending) = &slot.pending {
            tracing::debug!(%subject_id, in_flight = %pending.mutation_id, "mutation refused: busy");
            return Err(SyncError::Busy(subject_id.clone()));
        }

        let optimistic = shared.backend().project(&slot.snapshot.state, change)?;
        let prior = slot.snapshot.state.clone();
        slot.snapshot.overwrite_state(optimistic.clone());
        let pending = PendingMutation::new(
            subject_id.clone(),
            optimistic,
            prior,
            slot.snapshot.revision,
        );
        let mutation_id = pending.mutation_id;
        slot.pending = Some(pending);

        shared.publish_busy(true);
        shared.publish_update(UpdateSource::Optimistic, &slot.snapshot);
        tracing::info!(%subject_id, %mutation_id, ?change, "optimistic state applied");
        Ok(mutation_id)
    }

    fn confirm(
        &self,
        mutation_id: MutationId,
        confirmed: Versioned<B::State>,
    ) -> Result<MutationOutcome<B::State>, SyncError> {
        let shared = &self.shared;
        let subject_id = shared.subject_id();
        let mut slot = shared.lock();
        if !shared.is_alive() {
            tracing::debug!(%subject_id, %mutation_id, "confirmation after teardown dropped");
            return Err(SyncError::ViewClosed(subject_id.clone()));
        }
        let Some(mut pending) = slot.pending.take_if(|p| p.mutation_id == mutation_id) else {
            return Err(SyncError::Internal(format!(
                "mutation {mutation_id} is no longer pending"
            )));
        };

        let candidate = Candidate::from_versioned(
            confirmed,
            CandidateSource::MutationConfirm(mutation_id),
        );
        let corrected = candidate.state != pending.optimistic_state;
        let verdict = shared
            .policy()
            .arbitrate(&slot.snapshot, &candidate, Some(&pending));
        match verdict {
            Verdict::Accept { version } => {
                let changed = candidate.state != slot.snapshot.state;
                slot.snapshot.replace(candidate.state, version);
                if changed {
                    shared.publish_update(UpdateSource::MutationConfirm, &slot.snapshot);
                }
            }
            Verdict::Ignore(reason) => {
                tracing::debug!(%subject_id, %mutation_id, %reason, "confirmed state not displayed");
            }
        }
        pending.status = MutationStatus::Confirmed;

        shared.publish_busy(false);
        shared.publish(SyncEvent::MutationConfirmed {
            subject_id: subject_id.clone(),
            mutation_id,
            corrected,
            timestamp: Utc::now(),
        });
        tracing::info!(
            %subject_id,
            %mutation_id,
            status = ?pending.status,
            corrected,
            version = %slot.snapshot.version,
            "mutation confirmed"
        );
        Ok(MutationOutcome {
            mutation_id,
            state: slot.snapshot.state.clone(),
            corrected,
        })
    }

    fn fail(&self, mutation_id: MutationId, reason: &str) -> SyncError {
        let shared = &self.shared;
        let subject_id = shared.subject_id();
        let mut slot = shared.lock();
        if !shared.is_alive() {
            tracing::debug!(%subject_id, %mutation_id, %reason, "failure after teardown dropped");
            return SyncError::ViewClosed(subject_id.clone());
        }
        let Some(mut pending) = slot.pending.take_if(|p| p.mutation_id == mutation_id) else {
            return SyncError::Internal(format!("mutation {mutation_id} is no longer pending"));
        };
        pending.status = MutationStatus::Failed;

        let rollback = if slot.snapshot.revision == pending.applied_revision {
            slot.snapshot.overwrite_state(pending.prior_state);
            shared.publish_update(UpdateSource::Rollback, &slot.snapshot);
            RollbackOutcome::RolledBack
        } else {
            RollbackOutcome::Suppressed
        };

        shared.publish_busy(false);
        shared.publish(SyncEvent::MutationRejected {
            subject_id: subject_id.clone(),
            mutation_id,
            rollback,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        tracing::warn!(
            %subject_id,
            %mutation_id,
            status = ?pending.status,
            ?rollback,
            %reason,
            "mutation rejected"
        );
        SyncError::MutationRejected {
            subject_id: subject_id.clone(),
            mutation_id,
            rollback,
            reason: reason.to_string(),
        }
    }
}

/// Settles a mutation whose `perform` future was dropped mid-request, so
/// the subject does not stay busy forever.
struct SettleGuard<'a, B: ResourceBackend> {
    mutator: &'a OptimisticMutator<B>,
    mutation_id: MutationId,
    armed: bool,
}

impl<B: ResourceBackend> Drop for SettleGuard<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.mutator.fail(self.mutation_id, "mutation abandoned");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::SyncSettings;
    use crate::domain::Version;
    use crate::features::{LikeChange, LikeState, OrderChange, OrderStatus};
    use crate::push::SubjectFilter;
    use crate::sync::SubjectView;
    use crate::test_support::{
        LikeBackend, LikeHarness, drain, like_harness, order_harness, wait_until_busy,
    };

    fn post() -> SubjectId {
        SubjectId::from("post-1")
    }

    fn no_polling() -> SyncSettings {
        SyncSettings {
            polling_enabled: false,
            ..SyncSettings::default()
        }
    }

    async fn open_likes(initial: LikeState) -> (LikeHarness, SubjectView<LikeBackend>) {
        let h = like_harness(initial, no_polling());
        let Ok(view) = h.engine.open(post()).await else {
            panic!("open should succeed");
        };
        (h, view)
    }

    #[tokio::test]
    async fn like_then_failed_unlike_keeps_newer_push() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;

        h.replies.ok(LikeState::new(true, 11));
        let Ok(liked) = view.perform(LikeChange::Toggle).await else {
            panic!("like should be confirmed");
        };
        assert!(!liked.corrected);
        assert_eq!(view.state(), LikeState::new(true, 11));

        let mutator = view.mutator();
        let unlike = tokio::spawn(async move { mutator.perform(LikeChange::Toggle).await });
        wait_until_busy(&view).await;
        assert_eq!(view.state(), LikeState::new(false, 10));

        let delivered = h.push.publish(
            &SubjectFilter::Subject(post()),
            &json!({
                "postId": "post-1",
                "eventType": "like_changed",
                "newState": { "liked": true, "likes": 12 }
            }),
        );
        assert_eq!(delivered, 1);
        assert_eq!(view.state(), LikeState::new(true, 12));

        h.replies.fail(SyncError::Status(500));
        let Ok(result) = unlike.await else {
            panic!("mutation task panicked");
        };
        let Err(SyncError::MutationRejected { rollback, .. }) = result else {
            panic!("unlike should be rejected");
        };
        assert_eq!(rollback, RollbackOutcome::Suppressed);
        assert_eq!(view.state(), LikeState::new(true, 12));
        assert!(!view.is_busy());
    }

    #[tokio::test]
    async fn failure_without_interleaving_rolls_back() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;
        let mut rx = h.engine.event_bus().subscribe();

        h.replies.fail(SyncError::Status(503));
        let Err(err) = view.perform(LikeChange::Toggle).await else {
            panic!("mutation should fail");
        };
        assert!(err.is_user_visible());
        let SyncError::MutationRejected { rollback, .. } = err else {
            panic!("expected MutationRejected, got {err:?}");
        };
        assert_eq!(rollback, RollbackOutcome::RolledBack);
        assert_eq!(view.state(), LikeState::new(false, 10));

        let events = drain(&mut rx);
        let sources: Vec<UpdateSource> = events
            .iter()
            .filter_map(|event| match event {
                SyncEvent::SnapshotUpdated { source, .. } => Some(*source),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec![UpdateSource::Optimistic, UpdateSource::Rollback]);
        assert_eq!(events.iter().filter(|e| e.is_user_notice()).count(), 1);
    }

    #[tokio::test]
    async fn second_perform_while_pending_is_busy() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;

        let mutator = view.mutator();
        let first = tokio::spawn(async move { mutator.perform(LikeChange::Toggle).await });
        wait_until_busy(&view).await;

        let second = view.perform(LikeChange::Toggle).await;
        assert!(matches!(second, Err(SyncError::Busy(_))));
        assert_eq!(h.backend.mutate_calls(), 1);
        assert_eq!(view.state(), LikeState::new(true, 11));

        h.replies.ok(LikeState::new(true, 11));
        let Ok(Ok(outcome)) = first.await else {
            panic!("first mutation should be confirmed");
        };
        assert_eq!(outcome.state, LikeState::new(true, 11));
        assert!(!view.is_busy());
    }

    #[tokio::test]
    async fn server_correction_replaces_guess() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;

        h.replies.ok(LikeState::new(true, 15));
        let Ok(outcome) = view.perform(LikeChange::Toggle).await else {
            panic!("mutation should be confirmed");
        };
        assert!(outcome.corrected);
        assert_eq!(view.state(), LikeState::new(true, 15));
        assert_eq!(view.snapshot().version, Version::new(1));
    }

    #[tokio::test]
    async fn invalid_change_writes_nothing() {
        let (h, view) = open_likes(LikeState::new(true, 1)).await;

        let result = view.perform(LikeChange::Like).await;
        assert!(matches!(result, Err(SyncError::InvalidChange(_))));
        assert_eq!(h.backend.mutate_calls(), 0);
        assert_eq!(view.snapshot().revision, 0);
        assert!(!view.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_rejection() {
        let h = order_harness(
            Versioned::new(OrderStatus::Confirmed, Version::new(4)),
            SyncSettings {
                polling_enabled: false,
                mutation_timeout: Duration::from_secs(10),
                ..SyncSettings::default()
            },
        );
        let order = SubjectId::from("order-1");
        let Ok(view) = h.engine.open(order).await else {
            panic!("open should succeed");
        };

        let result = view.perform(OrderChange::Cancel).await;
        let Err(SyncError::MutationRejected { rollback, reason, .. }) = result else {
            panic!("timed out mutation should be rejected");
        };
        assert_eq!(rollback, RollbackOutcome::RolledBack);
        assert!(reason.contains("timed out"));
        assert_eq!(view.state(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn order_confirmation_carries_server_version() {
        let h = order_harness(
            Versioned::new(OrderStatus::Confirmed, Version::new(4)),
            no_polling(),
        );
        let Ok(view) = h.engine.open(SubjectId::from("order-1")).await else {
            panic!("open should succeed");
        };

        h.replies
            .ok_versioned(Versioned::new(OrderStatus::Preparing, Version::new(5)));
        let Some(change) = OrderChange::advance_from(OrderStatus::Confirmed) else {
            panic!("confirmed orders can advance");
        };
        let Ok(outcome) = view.perform(change).await else {
            panic!("mutation should be confirmed");
        };
        assert!(!outcome.corrected);
        assert_eq!(view.state(), OrderStatus::Preparing);
        assert_eq!(view.version(), Version::new(5));

        // The push echo of our own change is a duplicate.
        h.push.publish(
            &SubjectFilter::Subject(SubjectId::from("order-1")),
            &json!({ "orderId": "order-1", "newState": { "status": "preparing", "version": 5 } }),
        );
        assert_eq!(view.snapshot().revision, 2);
    }

    #[tokio::test]
    async fn confirmation_behind_newer_push_keeps_server_truth() {
        let h = order_harness(
            Versioned::new(OrderStatus::Confirmed, Version::new(4)),
            no_polling(),
        );
        let order = SubjectId::from("order-1");
        let Ok(view) = h.engine.open(order.clone()).await else {
            panic!("open should succeed");
        };
        let mut rx = h.engine.event_bus().subscribe();

        let mutator = view.mutator();
        let change = OrderChange::MoveTo(OrderStatus::Preparing);
        let advance = tokio::spawn(async move { mutator.perform(change).await });
        wait_until_busy(&view).await;
        assert_eq!(view.state(), OrderStatus::Preparing);

        h.push.publish(
            &SubjectFilter::Subject(order.clone()),
            &json!({ "orderId": "order-1", "newState": { "status": "out_for_delivery", "version": 7 } }),
        );
        assert_eq!(view.state(), OrderStatus::OutForDelivery);

        h.replies
            .ok_versioned(Versioned::new(OrderStatus::Preparing, Version::new(5)));
        let Ok(Ok(outcome)) = advance.await else {
            panic!("mutation should be confirmed");
        };
        assert!(!outcome.corrected);
        assert_eq!(outcome.state, OrderStatus::OutForDelivery);
        assert_eq!(view.state(), OrderStatus::OutForDelivery);
        assert_eq!(view.version(), Version::new(7));
        assert!(!view.is_busy());

        let confirm_updates = drain(&mut rx)
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    SyncEvent::SnapshotUpdated {
                        source: UpdateSource::MutationConfirm,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(confirm_updates, 0);

        h.backend
            .set_server(Some(Versioned::new(OrderStatus::OutForDelivery, Version::new(7))));
        tokio_test::assert_ok!(view.refresh().await);
        assert_eq!(view.state(), OrderStatus::OutForDelivery);
        assert_eq!(view.version(), Version::new(7));
    }

    #[tokio::test]
    async fn interleaved_push_does_not_mark_confirmation_corrected() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;
        let mut rx = h.engine.event_bus().subscribe();

        let mutator = view.mutator();
        let like = tokio::spawn(async move { mutator.perform(LikeChange::Toggle).await });
        wait_until_busy(&view).await;
        h.push.publish(
            &SubjectFilter::Subject(post()),
            &json!({ "postId": "post-1", "newState": { "liked": true, "likes": 12 } }),
        );
        assert_eq!(view.state(), LikeState::new(true, 12));

        h.replies.ok(LikeState::new(true, 11));
        let Ok(Ok(outcome)) = like.await else {
            panic!("like should be confirmed");
        };
        assert!(!outcome.corrected);
        assert_eq!(view.state(), LikeState::new(true, 11));

        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            SyncEvent::SnapshotUpdated {
                source: UpdateSource::MutationConfirm,
                ..
            }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            SyncEvent::MutationConfirmed {
                corrected: false,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn response_after_close_writes_nothing() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;
        let mut rx = h.engine.event_bus().subscribe();

        let mutator = view.mutator();
        let pending = tokio::spawn(async move { mutator.perform(LikeChange::Toggle).await });
        wait_until_busy(&view).await;
        view.close();

        h.replies.ok(LikeState::new(true, 11));
        let Ok(result) = pending.await else {
            panic!("mutation task panicked");
        };
        assert!(matches!(result, Err(SyncError::ViewClosed(_))));

        let events = drain(&mut rx);
        let after_close = events
            .iter()
            .skip_while(|event| !matches!(event, SyncEvent::ViewClosed { .. }))
            .skip(1)
            .count();
        assert_eq!(after_close, 0);
    }

    #[tokio::test]
    async fn mutator_outliving_view_is_refused() {
        let (h, view) = open_likes(LikeState::new(false, 0)).await;
        let mutator = view.mutator();
        view.close();

        let result = mutator.perform(LikeChange::Toggle).await;
        assert!(matches!(result, Err(SyncError::ViewClosed(_))));
        assert_eq!(h.backend.mutate_calls(), 0);
    }

    #[tokio::test]
    async fn abandoned_perform_releases_the_subject() {
        let (h, view) = open_likes(LikeState::new(false, 10)).await;

        let mutator = view.mutator();
        let abandoned = tokio::spawn(async move { mutator.perform(LikeChange::Toggle).await });
        wait_until_busy(&view).await;
        abandoned.abort();
        let _ = abandoned.await;

        assert!(!view.is_busy());
        assert_eq!(view.state(), LikeState::new(false, 10));
        assert_eq!(h.backend.mutate_calls(), 1);
    }
}
