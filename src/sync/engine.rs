//! Entry point that opens views and routes mutations.
//!
//! [`SyncEngine`] binds one [`ResourceBackend`] to one [`PushChannel`] and
//! one [`EventBus`]. Opening a subject loads its snapshot, subscribes it to
//! push and starts its polling fallback; the returned [`SubjectView`]
//! owns those feeds until it is closed or dropped.

use std::sync::Arc;

use crate::backend::ResourceBackend;
use crate::config::SyncSettings;
use crate::domain::{
    Candidate, CandidateSource, EventBus, ResourceSnapshot, SubjectId, Versioned,
};
use crate::error::SyncError;
use crate::push::{EventCallback, PushChannel, SubjectFilter};
use crate::reconcile::ReconciliationPolicy;

use super::mutator::{MutationOutcome, OptimisticMutator};
use super::registry::ViewRegistry;
use super::view::{SubjectView, ViewShared};

/// Opens subject views and performs mutations on them.
#[derive(Debug)]
pub struct SyncEngine<B: ResourceBackend> {
    backend: Arc<B>,
    push: Arc<dyn PushChannel>,
    bus: EventBus,
    settings: SyncSettings,
    policy: ReconciliationPolicy,
    registry: Arc<ViewRegistry<B>>,
}

impl<B: ResourceBackend> SyncEngine<B> {
    /// Creates an engine with no open views.
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        push: Arc<dyn PushChannel>,
        bus: EventBus,
        settings: SyncSettings,
    ) -> Self {
        Self {
            backend,
            push,
            bus,
            settings,
            policy: ReconciliationPolicy::new(),
            registry: Arc::new(ViewRegistry::new()),
        }
    }

    /// Bus carrying every view notification.
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Backend shared by every view.
    #[must_use]
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Engine timing settings.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Opens `subject_id`, subscribing to its own push topic.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::open_with_filter`].
    pub async fn open(&self, subject_id: SubjectId) -> Result<SubjectView<B>, SyncError> {
        let filter = SubjectFilter::Subject(subject_id.clone());
        self.open_with_filter(subject_id, filter).await
    }

    /// Opens `subject_id`, subscribing to push with `filter`.
    ///
    /// A broader filter (owner or all) is fine: payloads for other subjects
    /// are dropped by identity before arbitration.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidConfig`] if the settings are invalid.
    /// - [`SyncError::AlreadyOpen`] if a view for the subject is open.
    /// - The fetch error if the initial load fails.
    pub async fn open_with_filter(
        &self,
        subject_id: SubjectId,
        filter: SubjectFilter,
    ) -> Result<SubjectView<B>, SyncError> {
        self.settings.validate()?;
        if self.registry.contains(&subject_id) {
            return Err(SyncError::AlreadyOpen(subject_id));
        }

        let initial = self.backend.fetch(&subject_id).await?;
        let shared = Arc::new(ViewShared::new(
            ResourceSnapshot::new(subject_id.clone(), initial),
            Arc::clone(&self.backend),
            self.bus.clone(),
            self.policy,
            self.settings.mutation_timeout,
        ));
        self.registry.insert(&shared)?;
        shared.publish_loaded();

        let mut view = SubjectView::new(
            Arc::clone(&shared),
            Arc::clone(&self.push),
            Arc::clone(&self.registry),
        );

        let weak = Arc::downgrade(&shared);
        let on_event: EventCallback = Arc::new(move |raw: &serde_json::Value| {
            if let Some(shared) = weak.upgrade() {
                let _ = shared.handle_push(raw);
            }
        });
        view.set_subscription(self.push.subscribe(filter, on_event));

        if self.settings.polling_enabled {
            let backend = Arc::clone(&self.backend);
            let weak = Arc::downgrade(&shared);
            view.poller_mut().start(
                subject_id.clone(),
                self.settings.poll_interval,
                move |id: SubjectId| {
                    let backend = Arc::clone(&backend);
                    async move { backend.fetch(&id).await }
                },
                move |fetched: Versioned<B::State>| {
                    if let Some(shared) = weak.upgrade() {
                        let _ = shared.offer(Candidate::from_versioned(fetched, CandidateSource::Poll));
                    }
                },
            )?;
        }

        tracing::info!(
            %subject_id,
            kind = self.backend.kind(),
            polling = self.settings.polling_enabled,
            "view opened"
        );
        Ok(view)
    }

    /// Returns a mutator for the open view of `subject_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] if no view holds the subject.
    pub fn mutator(&self, subject_id: &SubjectId) -> Result<OptimisticMutator<B>, SyncError> {
        self.registry.get(subject_id).map(OptimisticMutator::new)
    }

    /// Performs `change` on the open view of `subject_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] if no view holds the subject, else
    /// see [`OptimisticMutator::perform`].
    pub async fn perform(
        &self,
        subject_id: &SubjectId,
        change: B::Change,
    ) -> Result<MutationOutcome<B::State>, SyncError> {
        self.mutator(subject_id)?.perform(change).await
    }

    /// Copy of the displayed snapshot for `subject_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] if no view holds the subject.
    pub fn snapshot(&self, subject_id: &SubjectId) -> Result<ResourceSnapshot<B::State>, SyncError> {
        self.registry.get(subject_id).map(|shared| shared.snapshot())
    }

    /// Subjects with an open view, sorted.
    #[must_use]
    pub fn open_subjects(&self) -> Vec<SubjectId> {
        self.registry.subjects()
    }
}
