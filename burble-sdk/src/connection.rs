//! WebSocket connection lifecycle.
//!
//! One logical connection per session, owned by a spawned task and exposed
//! as an explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (abnormal close) Reconnecting
//!                     ^                                           |
//!                     +-------------------------------------------+
//! ```
//!
//! A close with code 1000, or an explicit [`ConnectionHandle::stop`], ends
//! in the terminal `Closed` state; anything else schedules a retry. The
//! current state is published on a `watch` channel so callers can refuse
//! sends synchronously, and every transition is also emitted on the event
//! stream in order with the inbound frames.

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::{ConnectConfig, ReconnectConfig};
use crate::error::Error;

/// Lifecycle of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        })
    }
}

/// What the connection task reports upward.
#[derive(Debug)]
pub enum ConnEvent {
    State(ConnectionState),
    /// One raw inbound text frame. Emitted only while `Connected`.
    Frame(String),
}

#[derive(Debug)]
enum Ctl {
    Stop,
}

/// Handle to a running connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    out_tx: mpsc::Sender<String>,
    ctl_tx: mpsc::Sender<Ctl>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub(crate) fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queue one text frame for the wire. Refused while not `Connected`.
    pub async fn send(&self, frame: String) -> Result<(), Error> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        self.out_tx.send(frame).await.map_err(|_| Error::NotConnected)
    }

    /// Clean close: cancels any pending reconnect timer, sends close code
    /// 1000 if a socket is open, and settles in `Closed`. Idempotent.
    pub async fn stop(&self) {
        let _ = self.ctl_tx.send(Ctl::Stop).await;
    }
}

/// Validate the config and spawn the connection task.
pub fn start(
    config: ConnectConfig,
    reconnect: ReconnectConfig,
) -> Result<(ConnectionHandle, mpsc::Receiver<ConnEvent>), Error> {
    if config.username.trim().is_empty() {
        return Err(Error::Configuration(
            "username must not be empty".to_string(),
        ));
    }

    let url = config.ws_url();
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (ctl_tx, ctl_rx) = mpsc::channel(8);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let handle = ConnectionHandle {
        out_tx,
        ctl_tx,
        state_rx,
    };
    tokio::spawn(run_connection(
        url, reconnect, state_tx, event_tx, out_rx, ctl_rx,
    ));
    Ok((handle, event_rx))
}

enum CloseOutcome {
    /// Requested by us, or the server closed with code 1000.
    Clean,
    Abnormal(String),
}

async fn run_connection(
    url: String,
    reconnect: ReconnectConfig,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::Sender<ConnEvent>,
    mut out_rx: mpsc::Receiver<String>,
    mut ctl_rx: mpsc::Receiver<Ctl>,
) {
    let mut delay = reconnect.delay;
    let mut failed_cycles: u32 = 0;

    loop {
        set_state(&state_tx, &event_tx, ConnectionState::Connecting).await;

        let outcome = tokio::select! {
            attempt = connect_async(url.as_str()) => match attempt {
                Ok((socket, _response)) => {
                    delay = reconnect.delay;
                    failed_cycles = 0;
                    // Frames queued while the connection was down are stale
                    // (typing signals, mostly); start fresh.
                    while out_rx.try_recv().is_ok() {}
                    set_state(&state_tx, &event_tx, ConnectionState::Connected).await;
                    run_socket(socket, &event_tx, &mut out_rx, &mut ctl_rx).await
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %url, "connect failed");
                    CloseOutcome::Abnormal(format!("connect failed: {e}"))
                }
            },
            ctl = ctl_rx.recv() => {
                let _ = ctl;
                set_state(&state_tx, &event_tx, ConnectionState::Closed).await;
                return;
            }
        };

        let reason = match outcome {
            CloseOutcome::Clean => {
                set_state(&state_tx, &event_tx, ConnectionState::Closed).await;
                return;
            }
            CloseOutcome::Abnormal(reason) => reason,
        };

        failed_cycles = failed_cycles.saturating_add(1);
        if let Some(cap) = reconnect.max_attempts
            && failed_cycles > cap
        {
            tracing::warn!(attempts = failed_cycles, "reconnect attempt cap reached, giving up");
            set_state(&state_tx, &event_tx, ConnectionState::Closed).await;
            return;
        }

        tracing::info!(
            reason = %reason,
            delay_ms = delay.as_millis() as u64,
            "connection lost, scheduling reconnect"
        );
        set_state(&state_tx, &event_tx, ConnectionState::Reconnecting).await;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            ctl = ctl_rx.recv() => {
                // Stop request (or the handle went away) cancels the retry.
                let _ = ctl;
                set_state(&state_tx, &event_tx, ConnectionState::Closed).await;
                return;
            }
        }

        let scaled = delay.as_millis() as f64 * reconnect.backoff_factor;
        delay = std::cmp::min(
            std::time::Duration::from_millis(scaled as u64),
            reconnect.max_delay,
        );
    }
}

/// Drive one open socket until it closes one way or the other.
async fn run_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: &mpsc::Sender<ConnEvent>,
    out_rx: &mut mpsc::Receiver<String>,
    ctl_rx: &mut mpsc::Receiver<Ctl>,
) -> CloseOutcome {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if event_tx.send(ConnEvent::Frame(text.to_string())).await.is_err() {
                        // Consumer is gone; nothing left to deliver to.
                        let _ = sink.send(close_normal()).await;
                        return CloseOutcome::Clean;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return CloseOutcome::Abnormal(format!("pong write failed: {e}"));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let clean = frame
                        .as_ref()
                        .is_some_and(|f| f.code == CloseCode::Normal);
                    return if clean {
                        CloseOutcome::Clean
                    } else {
                        CloseOutcome::Abnormal(describe_close(frame))
                    };
                }
                // Binary, pong and raw frames are not part of this protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => return CloseOutcome::Abnormal(e.to_string()),
                None => {
                    return CloseOutcome::Abnormal("connection dropped without close frame".to_string())
                }
            },
            outbound = out_rx.recv() => {
                let Some(frame) = outbound else {
                    // Handle dropped; the ctl arm handles shutdown, but if
                    // both channels are gone just close out.
                    let _ = sink.send(close_normal()).await;
                    return CloseOutcome::Clean;
                };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    return CloseOutcome::Abnormal(format!("write failed: {e}"));
                }
            }
            ctl = ctl_rx.recv() => {
                let _ = ctl;
                let _ = sink.send(close_normal()).await;
                return CloseOutcome::Clean;
            }
        }
    }
}

fn close_normal() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static("session stop"),
    }))
}

fn describe_close(frame: Option<CloseFrame>) -> String {
    match frame {
        Some(frame) => format!(
            "closed with code {}: {}",
            u16::from(frame.code),
            frame.reason
        ),
        None => "closed without a close frame".to_string(),
    }
}

async fn set_state(
    state_tx: &watch::Sender<ConnectionState>,
    event_tx: &mpsc::Sender<ConnEvent>,
    state: ConnectionState,
) {
    // The watch is updated first so synchronous readers (send guards) agree
    // with the event stream.
    let _ = state_tx.send(state);
    let _ = event_tx.send(ConnEvent::State(state)).await;
    tracing::debug!(state = %state, "connection state");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_requires_an_identity() {
        let config = ConnectConfig {
            username: "  ".to_string(),
            ..ConnectConfig::default()
        };
        let err = start(config, ReconnectConfig::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn states_render_for_status_lines() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
