//! Wire envelope codec: the typed mapping between the JSON protocol and
//! domain events.
//!
//! Pure and stateless. Decoding never terminates the connection: a bad
//! envelope yields a [`ProtocolError`] and the caller drops that one frame.
//! Unknown `type` discriminators come back as [`Frame::Unknown`] so future
//! message kinds pass through harmlessly.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload kind carried by a chat message. Image and audio content travels
/// as a data URI in the `content` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
        })
    }
}

/// Decode failure for a single inbound envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope has no `type` discriminator")]
    MissingType,
    #[error("message envelope without a message_id")]
    MissingMessageId,
}

/// Inbound `message` envelope body. Also the shape of one history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub sender: String,
    pub content: String,
    pub channel: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(with = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Envelopes the backend broadcasts to the session.
///
/// Extra fields (the server stamps a timestamp on every notification) are
/// ignored; only what the engine consumes is modeled.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Message(WireMessage),
    UserJoined { username: String, channel: String },
    UserLeft { username: String, channel: String },
    TypingStatus { username: String, channel: String, is_typing: bool },
    MessageDeleted { message_id: String },
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(Inbound),
    /// A `type` this client does not know. Logged and ignored upstream.
    Unknown { kind: String },
}

const KNOWN_KINDS: &[&str] = &[
    "message",
    "user_joined",
    "user_left",
    "typing_status",
    "message_deleted",
];

/// Parse and classify one raw text frame.
pub fn decode_inbound(raw: &str) -> Result<Frame, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(ProtocolError::MissingType)?;
    if !KNOWN_KINDS.contains(&kind) {
        return Ok(Frame::Unknown {
            kind: kind.to_string(),
        });
    }
    let inbound: Inbound = serde_json::from_value(value)?;
    if let Inbound::Message(message) = &inbound
        && message.message_id.as_deref().is_none_or(str::is_empty)
    {
        // Every broadcast message has a server-assigned id; absence is a
        // protocol violation.
        return Err(ProtocolError::MissingMessageId);
    }
    Ok(Frame::Event(inbound))
}

/// Envelopes the session sends. `sender` and `channel` are stamped by the
/// engine; `message_id` and `timestamp` never are (server-assigned).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Message {
        sender: String,
        content: String,
        channel: String,
        message_type: MessageKind,
    },
    TypingStart {
        sender: String,
        channel: String,
    },
    TypingStop {
        sender: String,
        channel: String,
    },
}

pub fn encode_outbound(envelope: &Outbound) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Timestamp (de)serialization accepting both RFC 3339 and the backend's
/// naive `isoformat()` strings (interpreted as UTC).
pub(crate) mod ts {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unparseable timestamp `{raw}`")))
    }
}

/// Same leniency for optional timestamps.
pub(crate) mod ts_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => ser.serialize_some(&ts.to_rfc3339()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(de)?;
        match raw {
            None => Ok(None),
            Some(raw) => ts::parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("unparseable timestamp `{raw}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_broadcast_message() {
        let raw = r#"{
            "type": "message",
            "sender": "alice",
            "content": "hi",
            "channel": "general",
            "message_type": "text",
            "timestamp": "2025-06-01T10:00:00.123456",
            "message_id": "m1"
        }"#;
        let Frame::Event(Inbound::Message(msg)) = decode_inbound(raw).unwrap() else {
            panic!("expected a message frame");
        };
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.message_id.as_deref(), Some("m1"));
        assert_eq!(msg.message_type, MessageKind::Text);
    }

    #[test]
    fn decode_accepts_rfc3339_timestamps() {
        let raw = r#"{"type":"message","sender":"a","content":"x","channel":"c",
            "timestamp":"2025-06-01T10:00:00+02:00","message_id":"m"}"#;
        let Frame::Event(Inbound::Message(msg)) = decode_inbound(raw).unwrap() else {
            panic!("expected a message frame");
        };
        assert_eq!(msg.timestamp.to_rfc3339(), "2025-06-01T08:00:00+00:00");
    }

    #[test]
    fn message_without_id_is_a_protocol_violation() {
        let raw = r#"{"type":"message","sender":"a","content":"x","channel":"c",
            "timestamp":"2025-06-01T10:00:00"}"#;
        assert!(matches!(
            decode_inbound(raw),
            Err(ProtocolError::MissingMessageId)
        ));

        let raw = r#"{"type":"message","sender":"a","content":"x","channel":"c",
            "timestamp":"2025-06-01T10:00:00","message_id":""}"#;
        assert!(matches!(
            decode_inbound(raw),
            Err(ProtocolError::MissingMessageId)
        ));
    }

    #[test]
    fn decode_typing_status() {
        let raw = r#"{"type":"typing_status","username":"bob","channel":"general",
            "is_typing":true,"timestamp":"2025-06-01T10:00:00"}"#;
        let Frame::Event(Inbound::TypingStatus {
            username,
            is_typing,
            ..
        }) = decode_inbound(raw).unwrap()
        else {
            panic!("expected typing_status");
        };
        assert_eq!(username, "bob");
        assert!(is_typing);
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let raw = r#"{"type":"reaction_added","emoji":"+1"}"#;
        let Frame::Unknown { kind } = decode_inbound(raw).unwrap() else {
            panic!("expected unknown frame");
        };
        assert_eq!(kind, "reaction_added");
    }

    #[test]
    fn malformed_frames_fail_without_panicking() {
        assert!(matches!(
            decode_inbound("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"sender":"a"}"#),
            Err(ProtocolError::MissingType)
        ));
        // Declared type with a missing required field.
        assert!(matches!(
            decode_inbound(r#"{"type":"user_joined","channel":"general"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn outbound_message_never_carries_server_fields() {
        let envelope = Outbound::Message {
            sender: "alice".into(),
            content: "hi".into(),
            channel: "general".into(),
            message_type: MessageKind::Text,
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_outbound(&envelope).unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["message_type"], "text");
        assert!(value.get("message_id").is_none());
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn outbound_typing_envelopes() {
        let start = Outbound::TypingStart {
            sender: "alice".into(),
            channel: "general".into(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_outbound(&start).unwrap()).unwrap();
        assert_eq!(value["type"], "typing_start");
        assert_eq!(value["channel"], "general");
    }
}
