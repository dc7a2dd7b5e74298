//! Error taxonomy for the session engine.
//!
//! Transport and protocol failures are contained and converted to events;
//! nothing here tears a session down. The variants a caller sees directly
//! are [`Error::Configuration`] (from `start`), [`Error::NotConnected`]
//! (from a send attempted while the connection is down) and the REST
//! variants from the backend collaborators.

use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration before connecting. Fatal to
    /// `start()`, never to the process.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Transport-level failure. Recoverable; the connection task schedules
    /// a retry and surfaces the state transition.
    #[error("connection: {0}")]
    Connection(String),

    /// Malformed or semantically invalid inbound envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A send was attempted while the connection is not up. The caller
    /// keeps the input and should retry once reconnected.
    #[error("not connected")]
    NotConnected,

    /// HTTP transport failure talking to a REST collaborator.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// A REST collaborator answered with a non-success status.
    #[error("backend returned {status}: {detail}")]
    Api { status: u16, detail: String },
}
