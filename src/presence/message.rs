//! Chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::events::{Envelope, FrameError};

/// One chat message, either typed by the user or sent by support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server id for history entries, a fresh UUID for live messages.
    #[serde(default = "new_id", deserialize_with = "id_from_any")]
    pub id: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// `true` for messages the user sent.
    #[serde(default)]
    pub is_from_user: bool,
    /// When the message was sent.
    #[serde(default = "Utc::now", deserialize_with = "timestamp_from_any")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A message the user is sending now.
    #[must_use]
    pub fn outgoing(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            is_from_user: true,
            timestamp: Utc::now(),
        }
    }

    /// Decode a `chat_message` envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, FrameError> {
        serde_json::from_value(envelope.payload().clone()).map_err(|source| FrameError::Payload {
            kind: "chat_message".to_string(),
            source,
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(new_id()),
        other => Err(serde::de::Error::custom(format!("invalid message id: {other}"))),
    }
}

/// RFC 3339 string or epoch milliseconds.
fn timestamp_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid timestamp {s:?}: {e}"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {n}"))),
        other => Err(D::Error::custom(format!("invalid timestamp: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_frame_gets_uuid_and_millis_timestamp() {
        let envelope = Envelope::parse(
            r#"{"type":"chat_message","content":"On its way","isFromUser":false,"timestamp":1700000000000}"#,
        )
        .unwrap();
        let message = ChatMessage::from_envelope(&envelope).unwrap();

        assert_eq!(message.content, "On its way");
        assert!(!message.is_from_user);
        assert_eq!(message.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert!(uuid::Uuid::parse_str(&message.id).is_ok());
    }

    #[test]
    fn test_history_entry_keeps_numeric_id_and_rfc3339() {
        let message: ChatMessage = serde_json::from_str(
            r#"{"id":88,"content":"hi","isFromUser":true,"timestamp":"2026-03-01T12:00:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(message.id, "88");
        assert_eq!(message.timestamp.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_bad_timestamp_is_a_payload_error() {
        let envelope =
            Envelope::parse(r#"{"type":"chat_message","content":"x","timestamp":"yesterday"}"#)
                .unwrap();
        assert!(matches!(
            ChatMessage::from_envelope(&envelope),
            Err(FrameError::Payload { .. })
        ));
    }

    #[test]
    fn test_outgoing_is_from_user() {
        let message = ChatMessage::outgoing("extra napkins please");
        assert!(message.is_from_user);
        assert_eq!(message.content, "extra napkins please");
    }
}
