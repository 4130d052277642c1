//! Observable connection status

use std::fmt;

use serde::Serialize;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Lifecycle state of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected, not trying
    Disconnected,
    /// First attempt after an explicit connect
    Connecting,
    /// Socket is open
    Connected,
    /// Waiting for, or running, an automatic retry
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
        }
    }
}

/// Close code and reason reported by the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl From<CloseFrame<'_>> for CloseInfo {
    fn from(frame: CloseFrame<'_>) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.into_owned(),
        }
    }
}

/// Everything a status widget needs to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    #[serde(flatten)]
    pub state: ConnectionState,
    /// Most recent transport error, kept across reconnects
    pub last_error: Option<String>,
    /// How the most recent connection ended
    pub last_close: Option<CloseInfo>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            last_close: None,
        }
    }
}
