//! Sync layer: open views, optimistic mutations and the polling fallback.
//!
//! [`SyncEngine`] is the entry point. Each opened subject becomes a
//! [`SubjectView`] fed by push and by [`PollingFallback`]; user actions go
//! through [`OptimisticMutator`]. All three inputs are arbitrated by the
//! same [`crate::reconcile::ReconciliationPolicy`].

pub mod engine;
pub mod mutator;
pub mod polling;
mod registry;
pub mod view;

pub use engine::SyncEngine;
pub use mutator::{MutationOutcome, OptimisticMutator};
pub use polling::PollingFallback;
pub use view::SubjectView;
