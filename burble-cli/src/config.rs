//! Persistent defaults for the terminal client.
//!
//! Config file lives at `~/.config/burble/cli.toml`. Values merge as
//! CLI flags > config file > built-in defaults, and whatever was resolved
//! is saved back for next time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SERVER: &str = "127.0.0.1:8000";
pub const DEFAULT_CHANNEL: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend address (host:port).
    pub server: Option<String>,
    /// Display name to chat as.
    pub username: Option<String>,
    /// Channel to join.
    pub channel: Option<String>,
    /// Use TLS.
    pub tls: Option<bool>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("burble")
        .join("cli.toml")
}

impl Config {
    pub fn load() -> Self {
        let path = config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match toml::from_str(&raw) {
                    Ok(config) => return config,
                    Err(e) => eprintln!("Warning: bad config file {}: {e}", path.display()),
                },
                Err(e) => eprintln!("Warning: can't read {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        let path = config_path();
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(self) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&path, raw) {
                    eprintln!("Warning: can't save config: {e}");
                }
            }
            Err(e) => eprintln!("Warning: can't serialize config: {e}"),
        }
    }
}

/// Effective values after merging.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub server: String,
    pub username: String,
    pub channel: String,
    pub tls: bool,
}

impl Resolved {
    pub fn merge(cli: &super::Args, config: &Config) -> Self {
        let server = cli
            .server
            .clone()
            .or_else(|| config.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let username = cli
            .username
            .clone()
            .or_else(|| config.username.clone())
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "guest".to_string()));
        let channel = cli
            .channel
            .clone()
            .or_else(|| config.channel.clone())
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let tls = cli.tls || config.tls.unwrap_or(false);

        Self {
            server,
            username,
            channel,
            tls,
        }
    }

    /// Save the resolved values as the next run's defaults.
    pub fn persist(&self) {
        Config {
            server: Some(self.server.clone()),
            username: Some(self.username.clone()),
            channel: Some(self.channel.clone()),
            tls: Some(self.tls),
        }
        .save();
    }
}
