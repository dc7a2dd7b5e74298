//! Terminal client for burble: renders the session event stream to stdout
//! and reads messages and commands from stdin.
//!
//! Usage:
//!   burble --server 127.0.0.1:8000 --username alice --channel general
//!
//! Commands: plain text sends a message; `/users`, `/channels`,
//! `/delete <message-id>`, `/image <path>`, `/profile <display name>`,
//! `/quit`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use burble_sdk::api::{ChatBackend, HttpBackend, ProfileUpdate};
use burble_sdk::media::MediaAttachment;
use burble_sdk::protocol::MessageKind;
use burble_sdk::{ChatMessage, SessionConfig, SessionEngine, SessionEvent, SessionHandle};

mod config;

#[derive(Parser)]
#[command(name = "burble", about = "Terminal client for the burble chat backend")]
pub struct Args {
    /// Backend address (host:port)
    #[arg(long)]
    server: Option<String>,

    /// Display name to chat as
    #[arg(long)]
    username: Option<String>,

    /// Channel to join
    #[arg(long)]
    channel: Option<String>,

    /// Use TLS (wss/https)
    #[arg(long)]
    tls: bool,

    /// Reconnect delay in milliseconds
    #[arg(long)]
    reconnect_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let file = config::Config::load();
    let resolved = config::Resolved::merge(&args, &file);
    resolved.persist();
    tracing::debug!(?resolved, "effective configuration");

    let mut session_config = SessionConfig::default();
    session_config.connect.server = resolved.server.clone();
    session_config.connect.username = resolved.username.clone();
    session_config.connect.channel = resolved.channel.clone();
    session_config.connect.tls = resolved.tls;
    if let Some(ms) = args.reconnect_ms {
        session_config.reconnect.delay = Duration::from_millis(ms);
    }

    let backend = Arc::new(HttpBackend::new(session_config.connect.http_base()));
    let (handle, mut events) = SessionEngine::start(session_config, backend.clone())?;

    println!(
        "joining #{} on {} as {} — /quit to leave",
        resolved.channel, resolved.server, resolved.username
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => render(event),
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !dispatch(&handle, backend.as_ref(), &resolved, line.trim()).await {
                        handle.stop().await;
                    }
                }
                None => {
                    stdin_open = false;
                    handle.stop().await;
                }
            },
        }
    }
    Ok(())
}

/// Handle one input line. Returns false when the user asked to quit.
async fn dispatch(
    handle: &SessionHandle,
    backend: &HttpBackend,
    who: &config::Resolved,
    line: &str,
) -> bool {
    if line.is_empty() {
        return true;
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        match parts.next() {
            Some("quit") => return false,
            Some("users") => match backend.online_users(&who.channel).await {
                Ok(users) => {
                    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
                    println!("-- online in #{}: {}", who.channel, names.join(", "));
                }
                Err(e) => println!("-- could not fetch users: {e}"),
            },
            Some("channels") => match backend.active_channels().await {
                Ok(channels) => println!("-- active channels: {}", channels.join(", ")),
                Err(e) => println!("-- could not fetch channels: {e}"),
            },
            Some("delete") => match parts.next() {
                Some(id) => {
                    if let Err(e) = handle.delete_message(id).await {
                        println!("-- delete failed: {e}");
                    }
                }
                None => println!("usage: /delete <message-id>"),
            },
            Some("profile") => {
                let display_name = rest.trim_start_matches("profile").trim();
                if display_name.is_empty() {
                    println!("usage: /profile <display name>");
                } else {
                    let update = ProfileUpdate {
                        display_name: Some(display_name.to_string()),
                        ..ProfileUpdate::default()
                    };
                    match backend.update_profile(&who.username, update).await {
                        Ok(outcome) => println!("-- {}", outcome.message),
                        Err(e) => println!("-- profile update failed: {e}"),
                    }
                }
            }
            Some("image") => match parts.next() {
                Some(path) => match std::fs::read(path) {
                    Ok(bytes) => {
                        let attachment = MediaAttachment::image(mime_for(path), bytes);
                        if let Err(e) = handle.send_media(attachment).await {
                            println!("-- {e}; image not sent");
                        }
                    }
                    Err(e) => println!("-- can't read {path}: {e}"),
                },
                None => println!("usage: /image <path>"),
            },
            Some(other) => println!("unknown command: /{other}"),
            None => {}
        }
        return true;
    }

    // Line-buffered stdin can't observe keystrokes; a submitted line counts
    // as one typing burst.
    let _ = handle.input_activity().await;
    if let Err(e) = handle.send_text(line).await {
        println!("-- {e}; your input was not sent, try again once reconnected");
    }
    true
}

fn render(event: SessionEvent) {
    match event {
        SessionEvent::ConnectionChanged(state) => println!("-- connection: {state}"),
        SessionEvent::HistoryLoaded(messages) => {
            println!("-- history ({} messages)", messages.len());
            for message in &messages {
                print_message(message);
            }
        }
        SessionEvent::Message(message) => print_message(&message),
        SessionEvent::MessageRemoved { message_id } => {
            println!("-- message {message_id} was deleted");
        }
        SessionEvent::PresenceUpdated(users) => {
            let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
            println!("-- online: {}", names.join(", "));
        }
        SessionEvent::TypingChanged(peers) => match peers.len() {
            0 => {}
            1 => println!("-- {} is typing…", peers[0]),
            _ => println!("-- {} are typing…", peers.join(", ")),
        },
        SessionEvent::Notice { text } => println!("-- {text}"),
    }
}

fn mime_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn print_message(message: &ChatMessage) {
    let when = message
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let marker = if message.own { "*" } else { " " };
    match message.kind {
        MessageKind::Text => {
            println!("[{when}]{marker}<{}> {}", message.sender, message.content);
        }
        kind => {
            println!(
                "[{when}]{marker}<{}> [{kind} attachment, {} bytes]",
                message.sender,
                message.content.len()
            );
        }
    }
}
