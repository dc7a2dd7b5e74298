//! REST collaborators: the history and presence queries the engine pulls
//! from, plus the command endpoints (message ingress, deletion, profile
//! updates).
//!
//! The queries are idempotent GETs; their only effect on the engine is a
//! full replace of a local cache. [`ChatBackend`] is the seam: tests and
//! embedders inject their own, the CLI uses [`HttpBackend`].

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::presence::OnlineUser;
use crate::protocol::{MessageKind, WireMessage};

/// Payload for creating a message over the REST ingress (the alternate to
/// the live connection).
#[derive(Debug, Clone, Serialize)]
pub struct MessageCreate {
    pub sender: String,
    pub content: String,
    pub channel: String,
    pub message_type: MessageKind,
}

/// Profile fields that can change after signup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Canonical `{ success, message, data }` envelope the command endpoints
/// answer with.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct OnlineUsersResponse {
    online_users: Vec<OnlineUser>,
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

/// Query and command surface of the chat backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Newest `limit` messages of the channel, oldest first.
    async fn history(&self, channel: &str, limit: usize) -> Result<Vec<WireMessage>, Error>;

    /// Current online set for the channel.
    async fn online_users(&self, channel: &str) -> Result<Vec<OnlineUser>, Error>;

    /// Channels with recent activity.
    async fn active_channels(&self) -> Result<Vec<String>, Error>;

    /// Persist and broadcast a message without a live connection.
    async fn create_message(&self, message: MessageCreate) -> Result<CommandOutcome, Error>;

    /// Delete a message; the `message_deleted` broadcast closes the loop.
    async fn delete_message(&self, message_id: &str, channel: &str)
    -> Result<CommandOutcome, Error>;

    /// Update profile display fields.
    async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<CommandOutcome, Error>;
}

/// [`ChatBackend`] over HTTP. One `reqwest::Client` per session; the client
/// pools connections internally.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// `base` is `http(s)://host:port`, with or without a trailing slash.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            detail,
        })
    }
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn history(&self, channel: &str, limit: usize) -> Result<Vec<WireMessage>, Error> {
        let url = format!(
            "{}/api/chat/history/{}?limit={limit}",
            self.base,
            encode(channel)
        );
        let response = Self::checked(self.client.get(&url).send().await?).await?;
        let body: HistoryResponse = response.json().await?;
        Ok(body.messages)
    }

    async fn online_users(&self, channel: &str) -> Result<Vec<OnlineUser>, Error> {
        let url = format!("{}/api/users/online/{}", self.base, encode(channel));
        let response = Self::checked(self.client.get(&url).send().await?).await?;
        let body: OnlineUsersResponse = response.json().await?;
        Ok(body.online_users)
    }

    async fn active_channels(&self) -> Result<Vec<String>, Error> {
        let url = format!("{}/api/chat/channels", self.base);
        let response = Self::checked(self.client.get(&url).send().await?).await?;
        let body: ChannelsResponse = response.json().await?;
        Ok(body.channels)
    }

    async fn create_message(&self, message: MessageCreate) -> Result<CommandOutcome, Error> {
        let url = format!("{}/api/chat/message", self.base);
        let response =
            Self::checked(self.client.post(&url).json(&message).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete_message(
        &self,
        message_id: &str,
        channel: &str,
    ) -> Result<CommandOutcome, Error> {
        let url = format!(
            "{}/api/chat/message/{}?channel={}",
            self.base,
            encode(message_id),
            encode(channel)
        );
        let response = Self::checked(self.client.delete(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<CommandOutcome, Error> {
        let url = format!("{}/api/users/profile/{}", self.base, encode(username));
        let response = Self::checked(self.client.put(&url).json(&update).send().await?).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_response_shape() {
        let raw = r#"{
            "messages": [
                {"sender":"alice","content":"hi","channel":"general",
                 "message_type":"text","timestamp":"2025-06-01T10:00:00",
                 "message_id":"m1"}
            ],
            "total_count": 1,
            "channel": "general"
        }"#;
        let body: HistoryResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].sender, "alice");
    }

    #[test]
    fn online_users_response_shape() {
        let raw = r#"{
            "channel": "general",
            "online_users": [
                {"username":"bob","status":"online","last_seen":"2025-06-01T10:00:00"}
            ],
            "count": 1
        }"#;
        let body: OnlineUsersResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.online_users[0].username, "bob");
    }

    #[test]
    fn command_outcome_tolerates_missing_data() {
        let body: CommandOutcome =
            serde_json::from_str(r#"{"success":true,"message":"Message deleted successfully"}"#)
                .unwrap();
        assert!(body.success);
        assert!(body.data.is_none());
    }

    #[test]
    fn profile_update_serializes_only_set_fields() {
        let update = ProfileUpdate {
            display_name: Some("Alice".into()),
            ..ProfileUpdate::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["display_name"], "Alice");
        assert!(value.get("avatar_url").is_none());
    }

    #[test]
    fn message_create_matches_the_ingress_schema() {
        let message = MessageCreate {
            sender: "alice".into(),
            content: "via rest".into(),
            channel: "general".into(),
            message_type: MessageKind::Text,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["message_type"], "text");
        assert!(value.get("message_id").is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let backend = HttpBackend::new("http://localhost:8000/");
        assert_eq!(backend.base, "http://localhost:8000");
    }
}
