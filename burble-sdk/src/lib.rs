//! Client SDK for the burble real-time chat backend.
//!
//! The heart of the crate is the session synchronization engine: it keeps
//! one live WebSocket session against the backend, reconciles locally sent
//! and remotely broadcast messages without duplication, tracks who is
//! online in the channel, and surfaces ephemeral typing state with correct
//! timing. Rendering is the consumer's job: the engine hands over a stream
//! of [`SessionEvent`]s and takes commands through a [`SessionHandle`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use burble_sdk::api::HttpBackend;
//! use burble_sdk::{SessionConfig, SessionEngine, SessionEvent};
//!
//! # async fn example() -> Result<(), burble_sdk::Error> {
//! let mut config = SessionConfig::default();
//! config.connect.username = "alice".into();
//! config.connect.channel = "general".into();
//!
//! let backend = Arc::new(HttpBackend::new(config.connect.http_base()));
//! let (handle, mut events) = SessionEngine::start(config, backend)?;
//!
//! handle.send_text("hi").await?;
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Message(message) = event {
//!         println!("<{}> {}", message.sender, message.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Reconnection is automatic: an abnormal close schedules a retry (fixed
//! 3 s spacing by default, see [`ReconnectConfig`]) until
//! [`SessionHandle::stop`] performs a clean close. Every successful
//! (re)connect re-pulls the channel history and the presence set.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod media;
pub mod msgid;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod typing;

pub use config::{ConnectConfig, ReconnectConfig, SessionConfig};
pub use connection::ConnectionState;
pub use error::Error;
pub use event::{ChatMessage, SessionEvent};
pub use session::{SessionEngine, SessionHandle};
