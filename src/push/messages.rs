//! WebSocket message envelope used by the push transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-generated id for commands; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Room management commands sent to the push server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Join rooms.
    Subscribe {
        /// Room names (`subject:<id>`, `owner:<id>`, `*`).
        topics: Vec<String>,
    },
    /// Leave rooms.
    Unsubscribe {
        /// Room names to leave.
        topics: Vec<String>,
    },
}

impl WsCommand {
    /// Wraps the command in a [`WsMessage`] envelope.
    #[must_use]
    pub fn into_message(self) -> WsMessage {
        WsMessage {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Command,
            timestamp: Utc::now(),
            payload: serde_json::to_value(&self).unwrap_or_default(),
        }
    }
}

/// Extracts the deliverable payload from an incoming text frame.
///
/// Enveloped `event` messages yield their payload; `response` and `error`
/// envelopes yield nothing. Any other JSON is delivered as-is, since not
/// every producer uses the envelope.
#[must_use]
pub fn incoming_payload(text: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match serde_json::from_value::<WsMessage>(value.clone()) {
        Ok(msg) if msg.msg_type == WsMessageType::Event => Some(msg.payload),
        Ok(msg) => {
            tracing::debug!(id = %msg.id, msg_type = ?msg.msg_type, payload = %msg.payload, "push server reply");
            None
        }
        Err(_) => Some(value),
    }
}
