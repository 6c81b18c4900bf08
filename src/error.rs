//! Error types

use std::io;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Application errors for IRC transport, command dispatch and collaborator services.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failed to open the TCP connection to the server.
    #[error("Could not connect to {host}:{port}")]
    #[diagnostic(code(leetbot::connect))]
    Connect {
        /// The hostname we tried to connect to.
        host: String,
        /// The port we tried to connect to.
        port: u16,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The TCP connection could not be established within the connect timeout.
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),
    /// The server never sent a welcome before the registration deadline.
    #[error("Authentication timed out")]
    #[diagnostic(help("the server did not send 001, 376 or 422 in time"))]
    AuthenticationTimeout,
    /// The remote end closed the connection.
    #[error("Server closed the connection")]
    ConnectionLost,
    /// Attempted to send while there is no live connection.
    #[error("Not connected to IRC")]
    NotConnected,
    /// Writing to the socket failed.
    #[error("Could not send message")]
    Send(#[source] io::Error),
    /// Reading from the socket failed.
    #[error("Could not read from socket")]
    Read(#[from] io::Error),
    /// A notification was addressed to a server we don't know about.
    #[error("Unknown server `{0}'")]
    UnknownServer(String),
    /// A command handler failed.
    #[error("Command `{name}' failed")]
    Command {
        /// The name of the command.
        name: String,
        /// The reason the handler gave.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A command handler did not finish within the command timeout.
    #[error("Command timed out after {0:?}")]
    CommandTimeout(Duration),
    /// A collaborator service failed.
    #[error("Service error: {0}")]
    Service(Box<dyn std::error::Error + Send + Sync>),
    /// An HTTP request failed.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
    /// Reading or writing persisted state failed.
    #[error("Could not persist state to {path}")]
    Persist {
        /// The file being read or written.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Persisted state could not be (de)serialized.
    #[error("Invalid persisted state")]
    Json(#[from] serde_json::Error),
}
