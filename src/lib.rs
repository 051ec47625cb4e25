//! # marketplace-sync
//!
//! Client-side synchronization engine for a food-delivery marketplace.
//!
//! A displayed resource (an order's status, a post's like state) is kept
//! current from three inputs: the user's own optimistic mutations, server
//! push notifications, and a periodic polling fallback. Every input is a
//! candidate arbitrated by one [`reconcile::ReconciliationPolicy`], so the
//! display converges on the newest server state no matter which channel
//! delivers it first, and never regresses to an older one.
//!
//! ## Architecture
//!
//! ```text
//! UI (subscribes to EventBus)
//!     │
//!     ├── SyncEngine (sync/)
//!     │       ├── SubjectView ── ResourceSnapshot + PendingMutation
//!     │       ├── OptimisticMutator
//!     │       └── PollingFallback
//!     │
//!     ├── ReconciliationPolicy (reconcile/)
//!     │
//!     ├── PushChannel (push/) ── WebSocket or in-memory
//!     │
//!     └── ResourceBackend (backend/, features/) ── REST API
//! ```

pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod push;
pub mod reconcile;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
