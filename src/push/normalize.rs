//! Normalization of push payloads at the channel boundary.
//!
//! Upstream producers disagree on where identifying fields live: some put
//! the subject id and new state at the top level, others nest them under
//! `payload` or `data`. This module accepts both shapes so that the rest of
//! the engine sees a single [`NormalizedEvent`].

use serde_json::{Map, Value};

use crate::domain::SubjectId;

/// Containers searched after the top level, in order.
pub const NESTED_KEYS: &[&str] = &["payload", "data"];

const EVENT_TYPE_KEYS: &[&str] = &["eventType", "event_type", "event", "type"];
const STATE_KEYS: &[&str] = &["newState", "new_state"];

/// A push payload reduced to the fields the engine routes on.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// Subject the event describes.
    pub subject_id: SubjectId,
    /// Producer event type; empty if none was given.
    pub event_type: String,
    /// Body to hand to the backend's event decoder.
    pub body: Value,
}

/// Normalizes a raw payload.
///
/// The subject id is the first of `subject_keys` found at the top level,
/// then inside each of [`NESTED_KEYS`]. Numeric ids are accepted. The body
/// is the first `newState` found (top level, then nested), else the nested
/// container, else the whole payload. Unknown fields are ignored.
///
/// Returns `None` if no subject id can be found.
#[must_use]
pub fn normalize(raw: &Value, subject_keys: &[&str]) -> Option<NormalizedEvent> {
    let root = raw.as_object()?;
    let nested: Vec<&Map<String, Value>> = NESTED_KEYS
        .iter()
        .filter_map(|key| root.get(*key).and_then(Value::as_object))
        .collect();
    let containers = || std::iter::once(root).chain(nested.iter().copied());

    let subject_id = containers().find_map(|c| find_id(c, subject_keys))?;

    let event_type = containers()
        .find_map(|c| find_str(c, EVENT_TYPE_KEYS))
        .unwrap_or_default();

    let body = containers()
        .find_map(|c| STATE_KEYS.iter().find_map(|key| c.get(*key)))
        .or_else(|| root_nested_value(root))
        .cloned()
        .unwrap_or_else(|| raw.clone());

    Some(NormalizedEvent {
        subject_id,
        event_type,
        body,
    })
}

fn root_nested_value(root: &Map<String, Value>) -> Option<&Value> {
    NESTED_KEYS
        .iter()
        .find_map(|key| root.get(*key).filter(|v| v.is_object()))
}

fn find_id(container: &Map<String, Value>, keys: &[&str]) -> Option<SubjectId> {
    keys.iter().find_map(|key| match container.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(SubjectId::new(s.as_str())),
        Value::Number(n) => Some(SubjectId::new(n.to_string())),
        _ => None,
    })
}

fn find_str(container: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| container.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
