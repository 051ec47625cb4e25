//! Reconciliation layer: the arbitration rules shared by every input.
//!
//! Push events, poll results and mutation confirmations all pass through
//! [`ReconciliationPolicy`] before touching a displayed snapshot.

pub mod policy;

pub use policy::{IgnoreReason, ReconciliationPolicy, Verdict};
