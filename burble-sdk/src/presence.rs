//! Channel presence: who is online right now.
//!
//! The protocol never carries incremental deltas. Join/leave notifications
//! are only triggers to re-pull the authoritative set, which replaces the
//! tracked one wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One online participant, as reported by the presence query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineUser {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: String,
    #[serde(default, with = "crate::protocol::ts_opt")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A join/leave notification observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Joined(String),
    Left(String),
}

impl PresenceChange {
    pub fn subject(&self) -> &str {
        match self {
            PresenceChange::Joined(name) | PresenceChange::Left(name) => name,
        }
    }

    /// Display line for the notification event.
    pub fn describe(&self) -> String {
        match self {
            PresenceChange::Joined(name) => format!("{name} joined the channel"),
            PresenceChange::Left(name) => format!("{name} left the channel"),
        }
    }
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: Vec<OnlineUser>,
}

impl PresenceTracker {
    /// Swap in a freshly fetched online set. Readers never observe a
    /// partial update.
    pub fn replace(&mut self, users: Vec<OnlineUser>) {
        self.users = users;
    }

    pub fn users(&self) -> &[OnlineUser] {
        &self.users
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.users.iter().any(|user| user.username == username)
    }

    /// Whether a wire notification warrants a re-pull and a display
    /// notification. The acting session already knows its own state.
    pub fn should_refresh(&self, session_user: &str, change: &PresenceChange) -> bool {
        change.subject() != session_user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> OnlineUser {
        OnlineUser {
            username: name.to_string(),
            display_name: None,
            status: "online".to_string(),
            last_seen: None,
        }
    }

    #[test]
    fn refresh_replaces_instead_of_merging() {
        let mut presence = PresenceTracker::default();
        presence.replace(vec![user("alice"), user("bob")]);
        assert!(presence.is_online("bob"));

        presence.replace(vec![user("alice"), user("carol")]);
        assert!(!presence.is_online("bob"), "bob must not linger after a refresh");
        assert!(presence.is_online("carol"));
        assert_eq!(presence.users().len(), 2);
    }

    #[test]
    fn self_originated_changes_are_suppressed() {
        let presence = PresenceTracker::default();
        assert!(!presence.should_refresh("alice", &PresenceChange::Joined("alice".into())));
        assert!(presence.should_refresh("alice", &PresenceChange::Joined("bob".into())));
        assert!(presence.should_refresh("alice", &PresenceChange::Left("bob".into())));
    }

    #[test]
    fn online_user_accepts_backend_payload() {
        let raw = r#"{
            "username": "bob",
            "display_name": "Bob",
            "phone_number": "+15550100",
            "status": "online",
            "last_seen": "2025-06-01T10:00:00.500000"
        }"#;
        let user: OnlineUser = serde_json::from_str(raw).unwrap();
        assert_eq!(user.username, "bob");
        assert_eq!(user.status, "online");
        assert!(user.last_seen.is_some());
    }
}
