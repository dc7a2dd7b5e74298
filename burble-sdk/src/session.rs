//! The session engine.
//!
//! Sole owner of session-wide state: identity, channel, connection state,
//! the presence set and typing state all live behind one task, so wire
//! events, timers and user commands can never race each other. Everything
//! the rendering layer sees comes out as [`SessionEvent`]s; everything it
//! does goes in through a [`SessionHandle`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};

use crate::api::ChatBackend;
use crate::config::SessionConfig;
use crate::connection::{self, ConnEvent, ConnectionHandle, ConnectionState};
use crate::error::Error;
use crate::event::{ChatMessage, SessionEvent};
use crate::media::MediaAttachment;
use crate::msgid;
use crate::presence::{PresenceChange, PresenceTracker};
use crate::protocol::{self, Frame, Inbound, MessageKind, Outbound};
use crate::typing::{TypingCoordinator, TypingSignal};

#[derive(Debug)]
enum Command {
    SendText(String),
    SendMedia(MediaAttachment),
    InputActivity,
    DeleteMessage { message_id: String },
    Stop,
}

/// Cloneable handle for driving a running session.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Send a text message. Fails with [`Error::NotConnected`] while the
    /// connection is down; the caller keeps the input and retries later.
    pub async fn send_text(&self, content: impl Into<String>) -> Result<(), Error> {
        self.command_connected(Command::SendText(content.into()))
            .await
    }

    /// Send an image or audio payload.
    pub async fn send_media(&self, attachment: MediaAttachment) -> Result<(), Error> {
        self.command_connected(Command::SendMedia(attachment)).await
    }

    /// Raw input activity (one keystroke). Drives the typing debounce;
    /// quietly ignored while disconnected.
    pub async fn input_activity(&self) -> Result<(), Error> {
        self.command(Command::InputActivity).await
    }

    /// Ask the backend to delete a message. The `message_deleted`
    /// broadcast takes care of the rendered list.
    pub async fn delete_message(&self, message_id: impl Into<String>) -> Result<(), Error> {
        self.command(Command::DeleteMessage {
            message_id: message_id.into(),
        })
        .await
    }

    /// End the session: clean close, no reconnection, timers cancelled.
    /// Idempotent.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
    }

    async fn command_connected(&self, cmd: Command) -> Result<(), Error> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        self.command(cmd).await
    }

    async fn command(&self, cmd: Command) -> Result<(), Error> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::NotConnected)
    }
}

pub struct SessionEngine;

impl SessionEngine {
    /// Validate the configuration, open the connection and spawn the engine
    /// task. Returns the command handle and the event stream for the render
    /// sink.
    pub fn start(
        config: SessionConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>), Error> {
        let (conn, conn_rx) = connection::start(config.connect.clone(), config.reconnect.clone())?;
        let (event_tx, event_rx) = mpsc::channel(4096);
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let handle = SessionHandle {
            cmd_tx,
            state_rx: conn.state_watch(),
        };

        let engine = Engine {
            username: config.connect.username,
            channel: config.connect.channel,
            history_limit: config.history_limit,
            state: ConnectionState::Disconnected,
            typing: TypingCoordinator::new(config.typing_idle, config.typing_ttl),
            presence: PresenceTracker::default(),
            conn,
            backend,
            event_tx,
        };
        tokio::spawn(engine.run(conn_rx, cmd_rx));

        Ok((handle, event_rx))
    }
}

struct Engine {
    username: String,
    channel: String,
    history_limit: usize,
    state: ConnectionState,
    typing: TypingCoordinator,
    presence: PresenceTracker,
    conn: ConnectionHandle,
    backend: Arc<dyn ChatBackend>,
    event_tx: mpsc::Sender<SessionEvent>,
}

/// Sleep until a deadline, or forever when there is none. Keeps optional
/// timers usable as `select!` arms.
async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Engine {
    async fn run(
        mut self,
        mut conn_rx: mpsc::Receiver<ConnEvent>,
        mut cmd_rx: mpsc::Receiver<Command>,
    ) {
        loop {
            tokio::select! {
                conn_event = conn_rx.recv() => match conn_event {
                    Some(ConnEvent::State(state)) => self.on_state(state).await,
                    Some(ConnEvent::Frame(raw)) => self.on_frame(&raw).await,
                    None => break,
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Stop) | None => {
                        self.conn.stop().await;
                        // Drain the connection's farewell so the terminal
                        // `Closed` transition reaches the consumer.
                        while let Some(conn_event) = conn_rx.recv().await {
                            if let ConnEvent::State(state) = conn_event {
                                self.on_state(state).await;
                            }
                        }
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                },
                _ = maybe_sleep(self.typing.local_deadline()) => {
                    if let Some(TypingSignal::Stop) = self.typing.local_idle(Instant::now()) {
                        self.send_typing(false).await;
                    }
                }
                _ = maybe_sleep(self.typing.remote_deadline()) => {
                    if self.typing.expire_remote(Instant::now()) {
                        self.emit(SessionEvent::TypingChanged(self.typing.remote_typing()))
                            .await;
                    }
                }
            }
        }
        tracing::debug!(username = %self.username, "session engine stopped");
    }

    async fn on_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.emit(SessionEvent::ConnectionChanged(state)).await;
        match state {
            ConnectionState::Connected => self.bootstrap().await,
            ConnectionState::Reconnecting
            | ConnectionState::Disconnected
            | ConnectionState::Closed => {
                // Typing state does not survive the connection.
                self.typing.reset_local();
                if self.typing.reset_remote() {
                    self.emit(SessionEvent::TypingChanged(Vec::new())).await;
                }
            }
            ConnectionState::Connecting => {}
        }
    }

    /// On every successful (re)connect: history first, presence second.
    async fn bootstrap(&mut self) {
        match self.backend.history(&self.channel, self.history_limit).await {
            Ok(backlog) => {
                let messages = backlog
                    .into_iter()
                    .map(|wire| ChatMessage::from_wire(wire, &self.username))
                    .collect();
                self.emit(SessionEvent::HistoryLoaded(messages)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, channel = %self.channel, "history bootstrap failed");
                self.emit(SessionEvent::Notice {
                    text: format!("could not load history: {e}"),
                })
                .await;
            }
        }
        self.refresh_presence().await;
    }

    async fn refresh_presence(&mut self) {
        match self.backend.online_users(&self.channel).await {
            Ok(users) => {
                self.presence.replace(users);
                self.emit(SessionEvent::PresenceUpdated(
                    self.presence.users().to_vec(),
                ))
                .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, channel = %self.channel, "presence refresh failed");
            }
        }
    }

    async fn on_frame(&mut self, raw: &str) {
        let frame = match protocol::decode_inbound(raw) {
            Ok(frame) => frame,
            Err(e) => {
                // One bad envelope is dropped; the connection stays up.
                tracing::warn!(error = %e, "dropping invalid envelope");
                return;
            }
        };
        let inbound = match frame {
            Frame::Event(inbound) => inbound,
            Frame::Unknown { kind } => {
                tracing::debug!(kind = %kind, "ignoring unrecognized envelope kind");
                return;
            }
        };

        match inbound {
            Inbound::Message(wire) => {
                if wire.sender == self.username {
                    // The broadcast echo of a message already rendered
                    // optimistically at send time.
                    tracing::debug!(message_id = ?wire.message_id, "suppressing own echo");
                    return;
                }
                let message = ChatMessage::from_wire(wire, &self.username);
                self.emit(SessionEvent::Message(message)).await;
            }
            Inbound::UserJoined { username, .. } => {
                self.on_presence_change(PresenceChange::Joined(username))
                    .await;
            }
            Inbound::UserLeft { username, .. } => {
                self.on_presence_change(PresenceChange::Left(username)).await;
            }
            Inbound::TypingStatus {
                username,
                is_typing,
                ..
            } => {
                if username == self.username {
                    return;
                }
                if self.typing.remote_update(&username, is_typing, Instant::now()) {
                    self.emit(SessionEvent::TypingChanged(self.typing.remote_typing()))
                        .await;
                }
            }
            Inbound::MessageDeleted { message_id } => {
                // Removing an id that was never rendered is a no-op
                // downstream, not an error.
                self.emit(SessionEvent::MessageRemoved { message_id }).await;
            }
        }
    }

    async fn on_presence_change(&mut self, change: PresenceChange) {
        if !self.presence.should_refresh(&self.username, &change) {
            return;
        }
        self.refresh_presence().await;
        self.emit(SessionEvent::Notice {
            text: change.describe(),
        })
        .await;
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::SendText(content) => self.send_message(content, MessageKind::Text).await,
            Command::SendMedia(attachment) => {
                let kind = attachment.kind;
                self.send_message(attachment.to_data_uri(), kind).await;
            }
            Command::InputActivity => {
                if self.state != ConnectionState::Connected {
                    return;
                }
                if let Some(TypingSignal::Start) = self.typing.local_activity(Instant::now()) {
                    self.send_typing(true).await;
                }
            }
            Command::DeleteMessage { message_id } => {
                if let Err(e) = self.backend.delete_message(&message_id, &self.channel).await {
                    tracing::warn!(error = %e, message_id = %message_id, "delete failed");
                    self.emit(SessionEvent::Notice {
                        text: format!("delete failed: {e}"),
                    })
                    .await;
                }
            }
            // Handled by the run loop before dispatch.
            Command::Stop => {}
        }
    }

    /// Optimistic render first, then the wire envelope.
    async fn send_message(&mut self, content: String, kind: MessageKind) {
        if self.state != ConnectionState::Connected {
            // The handle refuses sends while down; a race can still land
            // here between the check and the state change.
            self.emit(SessionEvent::Notice {
                text: "not connected — message not sent".to_string(),
            })
            .await;
            return;
        }

        let local = ChatMessage {
            id: msgid::generate(),
            sender: self.username.clone(),
            content: content.clone(),
            kind,
            timestamp: Utc::now(),
            own: true,
        };
        self.emit(SessionEvent::Message(local)).await;

        self.transmit(Outbound::Message {
            sender: self.username.clone(),
            content,
            channel: self.channel.clone(),
            message_type: kind,
        })
        .await;

        // Sending ends the current typing burst.
        if let Some(TypingSignal::Stop) = self.typing.local_finish() {
            self.send_typing(false).await;
        }
    }

    async fn send_typing(&mut self, active: bool) {
        let envelope = if active {
            Outbound::TypingStart {
                sender: self.username.clone(),
                channel: self.channel.clone(),
            }
        } else {
            Outbound::TypingStop {
                sender: self.username.clone(),
                channel: self.channel.clone(),
            }
        };
        self.transmit(envelope).await;
    }

    async fn transmit(&mut self, envelope: Outbound) {
        let frame = match protocol::encode_outbound(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "envelope encode failed");
                return;
            }
        };
        if let Err(e) = self.conn.send(frame).await {
            tracing::warn!(error = %e, "send failed, connection is down");
        }
    }

    async fn emit(&self, event: SessionEvent) {
        // A consumer that dropped the receiver ends the session through the
        // command channel; here we just stop delivering.
        let _ = self.event_tx.send(event).await;
    }
}
