//! Feature strategies over the generic engine.
//!
//! Each feature is a thin [`crate::backend::ResourceBackend`]
//! configuration: fetch, mutate, projection and event decoding.

pub mod like_toggle;
pub mod order_status;

pub use like_toggle::{HttpLikeBackend, LikeChange, LikeState};
pub use order_status::{HttpOrderBackend, OrderChange, OrderStatus};
