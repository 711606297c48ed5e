//! Human-oriented view of incoming chat messages.
//!
//! Only used for logging: the relay stores and forwards payloads untouched.

use serde_json::Value;
use tracing::info;

/// Event tag the gateway uses for new or updated messages.
pub const MESSAGE_UPSERT: &str = "messages.upsert";

/// Placeholder for messages without a text body (images, audio, stickers...).
pub const MEDIA_PLACEHOLDER: &str = "media";

/// Sender and text of an inbound `messages.upsert` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Remote JID, e.g. "5511999@s.whatsapp.net"
    pub from: String,

    /// Plain text, extended text, or [`MEDIA_PLACEHOLDER`]
    pub content: String,
}

impl MessageSummary {
    /// Extract a summary from a gateway payload.
    ///
    /// Returns `None` for other event kinds and for messages sent by the
    /// instance itself (`data.key.fromMe == true`).
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if payload.get("event").and_then(Value::as_str) != Some(MESSAGE_UPSERT) {
            return None;
        }

        let data = payload.get("data")?;
        let key = data.get("key");

        let from_me = key
            .and_then(|key| key.get("fromMe"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if from_me {
            return None;
        }

        let from = key
            .and_then(|key| key.get("remoteJid"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let message = data.get("message");
        let content = message
            .and_then(|m| m.get("conversation"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .or_else(|| {
                message
                    .and_then(|m| m.pointer("/extendedTextMessage/text"))
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
            })
            .unwrap_or(MEDIA_PLACEHOLDER)
            .to_string();

        Some(Self { from, content })
    }

    /// Emit the summary as a structured log line.
    pub fn log(&self, correlation_id: &str) {
        info!(
            from = %self.from,
            content = %self.content,
            correlation_id = %correlation_id,
            "Message received"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_conversation() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": "5511999@s.whatsapp.net", "fromMe": false},
                "message": {"conversation": "hi"}
            }
        });

        let summary = MessageSummary::from_payload(&payload).unwrap();
        assert_eq!(summary.from, "5511999@s.whatsapp.net");
        assert_eq!(summary.content, "hi");
    }

    #[test]
    fn test_extended_text() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": "5511888@s.whatsapp.net"},
                "message": {"extendedTextMessage": {"text": "see https://example.com"}}
            }
        });

        let summary = MessageSummary::from_payload(&payload).unwrap();
        assert_eq!(summary.content, "see https://example.com");
    }

    #[test]
    fn test_media_fallback() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": "5511777@s.whatsapp.net", "fromMe": false},
                "message": {"imageMessage": {"mimetype": "image/jpeg"}}
            }
        });

        let summary = MessageSummary::from_payload(&payload).unwrap();
        assert_eq!(summary.content, MEDIA_PLACEHOLDER);
    }

    #[test]
    fn test_own_messages_are_skipped() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": "5511999@s.whatsapp.net", "fromMe": true},
                "message": {"conversation": "sent by us"}
            }
        });

        assert!(MessageSummary::from_payload(&payload).is_none());
    }

    #[test]
    fn test_other_events_are_skipped() {
        assert!(MessageSummary::from_payload(&json!({"event": "chats.update", "data": {}})).is_none());
        assert!(MessageSummary::from_payload(&json!({"event": "messages.upsert"})).is_none());
        assert!(MessageSummary::from_payload(&json!(null)).is_none());
    }
}
