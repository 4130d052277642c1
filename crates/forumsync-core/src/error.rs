//! Error types
//!
//! Typed errors for the live session and for event decoding. Transport
//! failures are retried by the session and never surface as fatal; these
//! types exist so callers and logs can tell the cases apart.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the live session and its handle
#[derive(Error, Debug)]
pub enum SyncError {
    /// Server URL could not be parsed
    #[error("Invalid server endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// Server URL is not a WebSocket URL
    #[error("Unsupported endpoint scheme '{0}'. Use ws:// or wss://")]
    UnsupportedScheme(String),

    /// Credentials produced no token at connect time
    #[error("No authentication token available")]
    MissingToken,

    /// Attempted to send while the connection is not open
    #[error("Not connected")]
    NotConnected,

    /// Outbound command could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The background session task has stopped
    #[error("Live session is no longer running")]
    SessionClosed,

    /// WebSocket protocol or I/O failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The server did not complete the handshake in time
    #[error("Timed out after {0:?} waiting for the server to accept the connection")]
    ConnectTimeout(Duration),
}

impl SyncError {
    /// Check if the backoff loop should keep retrying after this error
    ///
    /// Configuration problems (bad URL, no token) will not fix themselves
    /// by waiting, everything on the wire might.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::WebSocket(_) | SyncError::ConnectTimeout(_) | SyncError::NotConnected
        )
    }
}

/// Errors raised while turning an envelope into a typed event
#[derive(Error, Debug)]
pub enum EventError {
    /// A field the event kind requires is absent
    #[error("'{kind}' event is missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// The payload does not have the expected shape
    #[error("'{kind}' event has an invalid payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for live session operations
pub type SyncResult<T> = Result<T, SyncError>;
