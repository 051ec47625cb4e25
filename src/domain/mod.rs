//! Domain layer: snapshots, mutations, events, and the notification bus.
//!
//! This module contains the client-side data model: subject identity,
//! versions, the displayed snapshot, in-flight mutation records, push
//! events and the candidates built from them, plus the bus that carries
//! view notifications to the UI.

pub mod event_bus;
pub mod pending;
pub mod resource_event;
pub mod snapshot;
pub mod subject_id;
pub mod sync_event;
pub mod version;

pub use event_bus::{EventBus, SubjectEvents};
pub use pending::{MutationStatus, PendingMutation};
pub use resource_event::{Candidate, CandidateSource, ResourceEvent};
pub use snapshot::{ResourceSnapshot, Versioned};
pub use subject_id::{MutationId, SubjectId};
pub use sync_event::{SyncEvent, UpdateSource};
pub use version::Version;
