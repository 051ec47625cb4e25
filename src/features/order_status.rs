//! Order-status tracking: server-versioned, push + poll, merchant actions.
//!
//! Versions come from the server: an explicit `version`/`sequence` field
//! when present, otherwise `updatedAt` in epoch millis.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::backend::{ApiClient, ResourceBackend};
use crate::domain::{SubjectId, Version, Versioned};
use crate::error::SyncError;

/// Lifecycle status of a marketplace order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum OrderStatus {
    /// Placed, awaiting merchant.
    Pending,
    /// Accepted by the merchant.
    Confirmed,
    /// Being prepared.
    Preparing,
    /// Handed to the courier.
    OutForDelivery,
    /// Delivered to the customer.
    Delivered,
    /// Cancelled by customer or merchant.
    Cancelled,
}

impl OrderStatus {
    /// Returns the status as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the next status in the fulfilment flow.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparing),
            Self::Preparing => Some(Self::OutForDelivery),
            Self::OutForDelivery => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    /// Returns `true` if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Returns `true` while the order may still be cancelled.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Confirmed => 1,
            Self::Preparing => 2,
            Self::OutForDelivery => 3,
            Self::Delivered => 4,
            Self::Cancelled => 5,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    /// Accepts any case and `-`, `_` or space separators
    /// (`"Out for delivery"`, `"out-for-delivery"`, `"OUT_FOR_DELIVERY"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "pending" | "placed" => Ok(Self::Pending),
            "confirmed" | "accepted" => Ok(Self::Confirmed),
            "preparing" | "processing" => Ok(Self::Preparing),
            "outfordelivery" | "shipped" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("unknown order status: {s}")),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Merchant or customer action on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderChange {
    /// Move forward to the given status.
    MoveTo(OrderStatus),
    /// Cancel the order.
    Cancel,
}

impl OrderChange {
    /// The change that advances `current` one step, if any.
    #[must_use]
    pub fn advance_from(current: OrderStatus) -> Option<Self> {
        current.next().map(Self::MoveTo)
    }

    /// Status the server is asked to record.
    #[must_use]
    pub const fn target(self) -> OrderStatus {
        match self {
            Self::MoveTo(status) => status,
            Self::Cancel => OrderStatus::Cancelled,
        }
    }
}

/// Computes the optimistic status for `change`.
///
/// # Errors
///
/// Returns [`SyncError::InvalidChange`] for backwards moves, moves out of a
/// terminal status, or cancelling an order already in preparation.
pub fn project_order(current: &OrderStatus, change: &OrderChange) -> Result<OrderStatus, SyncError> {
    match *change {
        OrderChange::Cancel if current.is_cancellable() => Ok(OrderStatus::Cancelled),
        OrderChange::Cancel => Err(SyncError::InvalidChange(format!(
            "order in status {current} can no longer be cancelled"
        ))),
        OrderChange::MoveTo(OrderStatus::Cancelled) => project_order(current, &OrderChange::Cancel),
        OrderChange::MoveTo(target) if current.is_terminal() => Err(SyncError::InvalidChange(
            format!("order in status {current} cannot move to {target}"),
        )),
        OrderChange::MoveTo(target) if target.rank() <= current.rank() => Err(
            SyncError::InvalidChange(format!("cannot move order back from {current} to {target}")),
        ),
        OrderChange::MoveTo(target) => Ok(target),
    }
}

/// Returns `true` if `candidate` lies behind `current` in the lifecycle.
/// Nothing follows a terminal status.
#[must_use]
pub fn order_regresses(current: &OrderStatus, candidate: &OrderStatus) -> bool {
    candidate != current && (current.is_terminal() || candidate.rank() < current.rank())
}

/// Order payload as sent by fetch, mutate and push.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderWire {
    #[serde(alias = "orderStatus", alias = "newStatus")]
    status: OrderStatus,
    #[serde(default, alias = "updated_at")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "sequence")]
    version: Option<u64>,
}

impl From<OrderWire> for Versioned<OrderStatus> {
    fn from(wire: OrderWire) -> Self {
        let version = wire
            .version
            .map(Version::new)
            .or_else(|| wire.updated_at.map(Version::from_timestamp));
        Self {
            state: wire.status,
            version,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

/// Decodes an order event body: either an order object or a bare status.
#[must_use]
pub fn decode_order(body: &serde_json::Value) -> Option<Versioned<OrderStatus>> {
    match body {
        serde_json::Value::String(s) => s.parse().ok().map(Versioned::unversioned),
        serde_json::Value::Object(_) => serde_json::from_value::<OrderWire>(body.clone())
            .ok()
            .map(Versioned::from),
        _ => None,
    }
}

/// Order-status backend over the REST API.
#[derive(Debug, Clone)]
pub struct HttpOrderBackend {
    api: ApiClient,
}

impl HttpOrderBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResourceBackend for HttpOrderBackend {
    type State = OrderStatus;
    type Change = OrderChange;

    fn kind(&self) -> &'static str {
        "order"
    }

    fn subject_keys(&self) -> &'static [&'static str] {
        &["orderId", "order_id", "subjectId", "_id", "id"]
    }

    fn project(&self, current: &OrderStatus, change: &OrderChange) -> Result<OrderStatus, SyncError> {
        project_order(current, change)
    }

    fn regresses(&self, current: &OrderStatus, candidate: &OrderStatus) -> bool {
        order_regresses(current, candidate)
    }

    fn decode_event(&self, body: &serde_json::Value) -> Option<Versioned<OrderStatus>> {
        decode_order(body)
    }

    async fn fetch(&self, subject_id: &SubjectId) -> Result<Versioned<OrderStatus>, SyncError> {
        let wire: OrderWire = self.api.get_json(&format!("/orders/{subject_id}")).await?;
        Ok(wire.into())
    }

    async fn mutate(
        &self,
        subject_id: &SubjectId,
        change: &OrderChange,
    ) -> Result<Versioned<OrderStatus>, SyncError> {
        let body = StatusUpdate {
            status: change.target(),
        };
        let wire: OrderWire = self
            .api
            .send_json(Method::PATCH, &format!("/orders/{subject_id}/status"), Some(&body))
            .await?;
        tracing::info!(%subject_id, status = %wire.status, "order status updated");
        Ok(wire.into())
    }
}
