//! Events the session engine emits for the rendering layer to consume.

use chrono::{DateTime, Utc};

use crate::connection::ConnectionState;
use crate::presence::OnlineUser;
use crate::protocol::{MessageKind, WireMessage};

/// A message as handed to the render sink.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Server id once known, else a locally generated placeholder.
    pub id: String,
    pub sender: String,
    /// Text, or a data URI for image/audio payloads.
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// Derived: sender equals the session username.
    pub own: bool,
}

impl ChatMessage {
    pub(crate) fn from_wire(wire: WireMessage, session_user: &str) -> Self {
        let own = wire.sender == session_user;
        Self {
            id: wire
                .message_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(crate::msgid::generate),
            sender: wire.sender,
            content: wire.content,
            kind: wire.message_type,
            timestamp: wire.timestamp,
            own,
        }
    }
}

/// Events the engine emits to the consumer (TUI, GUI, bot, test harness).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection lifecycle transition.
    ConnectionChanged(ConnectionState),
    /// Channel backlog fetched on (re)connect, oldest first. Replaces
    /// anything currently rendered.
    HistoryLoaded(Vec<ChatMessage>),
    /// One new message, to render exactly once.
    Message(ChatMessage),
    /// Remove a rendered message. Unknown ids are a no-op.
    MessageRemoved { message_id: String },
    /// Authoritative online set for the channel (full replacement).
    PresenceUpdated(Vec<OnlineUser>),
    /// Peers currently typing, sorted. Empty reverts to channel info.
    TypingChanged(Vec<String>),
    /// One-line, non-blocking display notification.
    Notice { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(sender: &str, id: Option<&str>) -> WireMessage {
        WireMessage {
            sender: sender.to_string(),
            content: "hi".to_string(),
            channel: "general".to_string(),
            message_type: MessageKind::Text,
            timestamp: Utc::now(),
            message_id: id.map(str::to_string),
        }
    }

    #[test]
    fn own_is_derived_from_the_session_user() {
        assert!(ChatMessage::from_wire(wire("alice", Some("m1")), "alice").own);
        assert!(!ChatMessage::from_wire(wire("bob", Some("m1")), "alice").own);
    }

    #[test]
    fn missing_history_id_gets_a_placeholder() {
        let message = ChatMessage::from_wire(wire("bob", None), "alice");
        assert_eq!(message.id.len(), 26);
        let message = ChatMessage::from_wire(wire("bob", Some("m7")), "alice");
        assert_eq!(message.id, "m7");
    }
}
