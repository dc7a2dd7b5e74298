//! Configuration for a chat session.

use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// Where to connect and who we are.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Backend address as `host:port` (no scheme).
    pub server: String,
    /// Identity chosen at authentication; immutable for the session.
    pub username: String,
    /// The one channel this session lives in.
    pub channel: String,
    /// Use TLS (`wss://` / `https://`).
    pub tls: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8000".to_string(),
            username: String::new(),
            channel: "general".to_string(),
            tls: false,
        }
    }
}

impl ConnectConfig {
    /// The live-connection target:
    /// `ws(s)://<host>/ws/chat?username=<urlencoded>&channel=<name>`.
    pub fn ws_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        let username = utf8_percent_encode(&self.username, NON_ALPHANUMERIC);
        let channel = utf8_percent_encode(&self.channel, NON_ALPHANUMERIC);
        format!(
            "{scheme}://{}/ws/chat?username={username}&channel={channel}",
            self.server
        )
    }

    /// Base URL for the REST collaborators.
    pub fn http_base(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}", self.server)
    }
}

/// Retry policy after an abnormal close.
///
/// The defaults keep the compatibility contract: fixed 3000 ms spacing and
/// no attempt cap. Production deployments should raise `backoff_factor`
/// (e.g. 2.0 toward `max_delay`) and consider a cap.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first (and, without backoff, every) retry.
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed cycle.
    pub backoff_factor: f64,
    /// Ceiling for the grown delay.
    pub max_delay: Duration,
    /// Give up after this many consecutive failed cycles. `None` retries
    /// until `stop()`.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Everything the engine needs to run a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect: ConnectConfig,
    pub reconnect: ReconnectConfig,
    /// Local inactivity window before `typing_stop` goes out.
    pub typing_idle: Duration,
    /// TTL on a remote typing indicator with no refreshing signal.
    pub typing_ttl: Duration,
    /// Newest-window size for the history bootstrap.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect: ConnectConfig::default(),
            reconnect: ReconnectConfig::default(),
            typing_idle: Duration::from_millis(2000),
            typing_ttl: Duration::from_millis(5000),
            history_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_encodes_query_values() {
        let config = ConnectConfig {
            server: "chat.example.org:8000".into(),
            username: "alice smith".into(),
            channel: "general".into(),
            tls: true,
        };
        assert_eq!(
            config.ws_url(),
            "wss://chat.example.org:8000/ws/chat?username=alice%20smith&channel=general"
        );
        assert_eq!(config.http_base(), "https://chat.example.org:8000");
    }

    #[test]
    fn defaults_match_the_protocol_contract() {
        let config = SessionConfig::default();
        assert_eq!(config.reconnect.delay, Duration::from_millis(3000));
        assert_eq!(config.reconnect.max_attempts, None);
        assert_eq!(config.typing_idle, Duration::from_millis(2000));
        assert_eq!(config.typing_ttl, Duration::from_millis(5000));
        assert_eq!(config.history_limit, 50);
    }
}
