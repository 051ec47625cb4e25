//! Push layer: channel contract, adapters, and payload normalization.
//!
//! The engine consumes push notifications through the [`PushChannel`]
//! trait. [`InMemoryPushChannel`] fans out in-process; [`WsPushChannel`]
//! talks to the marketplace push server over WebSocket. Raw payloads are
//! reduced to a [`normalize::NormalizedEvent`] before they reach a view.

pub mod channel;
pub mod memory;
pub mod messages;
pub mod normalize;
pub mod subscription;
pub mod ws;

pub use channel::{EventCallback, PushChannel, SubjectFilter, SubscriptionHandle};
pub use memory::InMemoryPushChannel;
pub use normalize::{NormalizedEvent, normalize};
pub use ws::WsPushChannel;
