//! Core event type for the relay.
//!
//! An [`Event`] is one webhook payload exactly as the gateway sent it, plus
//! the `receivedAt` timestamp assigned when it entered the store. Payloads are
//! kept as a generic JSON document because the gateway emits many shapes and
//! the relay only ever peeks at a couple of fields.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Field name carrying the receipt timestamp in serialized events.
pub const RECEIVED_AT_FIELD: &str = "receivedAt";

/// A received webhook event.
///
/// # Serialization
///
/// When the payload is a JSON object, its fields are emitted unchanged
/// followed by `receivedAt`:
///
/// ```json
/// {
///   "event": "messages.upsert",
///   "instance": "main",
///   "data": { "key": { "remoteJid": "5511999@s.whatsapp.net" } },
///   "receivedAt": "2025-12-11T10:00:00.000Z"
/// }
/// ```
///
/// Any other document (array, string, number, null) is wrapped as
/// `{"payload": <document>, "receivedAt": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The document as received
    pub payload: Value,

    /// Set by the store on append
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Stamp a payload with the current time.
    pub fn new(payload: Value) -> Self {
        Self::received(payload, Utc::now())
    }

    /// Stamp a payload with an explicit receipt time.
    pub fn received(payload: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            received_at,
        }
    }

    /// The `event` tag naming the event kind (e.g. "messages.upsert"), if any.
    pub fn kind(&self) -> Option<&str> {
        self.payload.get("event").and_then(Value::as_str)
    }

    /// The gateway instance name, if the payload carries one.
    pub fn instance(&self) -> Option<&str> {
        self.payload.get("instance").and_then(Value::as_str)
    }

    /// Receipt time as an ISO 8601 string with millisecond precision.
    pub fn received_at_rfc3339(&self) -> String {
        self.received_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let received_at = self.received_at_rfc3339();

        match &self.payload {
            Value::Object(fields) => {
                let extra = usize::from(!fields.contains_key(RECEIVED_AT_FIELD));
                let mut map = serializer.serialize_map(Some(fields.len() + extra))?;
                for (key, value) in fields {
                    // the server-assigned timestamp wins over a client-supplied one
                    if key != RECEIVED_AT_FIELD {
                        map.serialize_entry(key, value)?;
                    }
                }
                map.serialize_entry(RECEIVED_AT_FIELD, &received_at)?;
                map.end()
            }
            other => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("payload", other)?;
                map.serialize_entry(RECEIVED_AT_FIELD, &received_at)?;
                map.end()
            }
        }
    }
}
