//! Open-view bookkeeping.
//!
//! [`ViewRegistry`] maps each subject to the live state of its open view.
//! Entries are weak: the registry never keeps a view alive, and an entry
//! whose view has been torn down counts as absent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::view::ViewShared;
use crate::backend::ResourceBackend;
use crate::domain::SubjectId;
use crate::error::SyncError;

/// Subject to open-view map shared by an engine and its views.
#[derive(Debug)]
pub(crate) struct ViewRegistry<B: ResourceBackend> {
    views: Mutex<HashMap<SubjectId, Weak<ViewShared<B>>>>,
}

impl<B: ResourceBackend> ViewRegistry<B> {
    pub(crate) fn new() -> Self {
        Self {
            views: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<SubjectId, Weak<ViewShared<B>>>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `shared` as the open view of its subject.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyOpen`] if another live view holds the
    /// subject.
    pub(crate) fn insert(&self, shared: &Arc<ViewShared<B>>) -> Result<(), SyncError> {
        let mut map = self.map();
        let subject_id = shared.subject_id();
        if map
            .get(subject_id)
            .and_then(Weak::upgrade)
            .is_some_and(|existing| existing.is_alive())
        {
            return Err(SyncError::AlreadyOpen(subject_id.clone()));
        }
        map.insert(subject_id.clone(), Arc::downgrade(shared));
        Ok(())
    }

    /// Returns `true` if a live view holds `subject_id`.
    pub(crate) fn contains(&self, subject_id: &SubjectId) -> bool {
        self.get(subject_id).is_ok()
    }

    /// Returns the live view state for `subject_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] if no live view holds the subject.
    pub(crate) fn get(&self, subject_id: &SubjectId) -> Result<Arc<ViewShared<B>>, SyncError> {
        self.map()
            .get(subject_id)
            .and_then(Weak::upgrade)
            .filter(|shared| shared.is_alive())
            .ok_or_else(|| SyncError::NotOpen(subject_id.clone()))
    }

    /// Removes the entry for `shared`'s subject if it still points at
    /// `shared`.
    pub(crate) fn remove(&self, shared: &Arc<ViewShared<B>>) {
        let mut map = self.map();
        let subject_id = shared.subject_id();
        let ours = map
            .get(subject_id)
            .is_some_and(|entry| entry.as_ptr() == Arc::as_ptr(shared));
        if ours {
            map.remove(subject_id);
        }
    }

    /// Subjects with a live view, sorted.
    pub(crate) fn subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<SubjectId> = self
            .map()
            .iter()
            .filter(|(_, entry)| entry.upgrade().is_some_and(|shared| shared.is_alive()))
            .map(|(subject_id, _)| subject_id.clone())
            .collect();
        subjects.sort();
        subjects
    }
}
