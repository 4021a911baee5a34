use crate::relay::RelayDirection;
use thiserror::Error;

/// Error taxonomy for a bridge session
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection refused by {addr}")]
    ConnectionRefused { addr: String },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error ({direction}): {source}")]
    Transport {
        direction: RelayDirection,
        #[source]
        source: std::io::Error,
    },

    #[error("Termination failure: {0}")]
    TerminationFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    /// Maps a failed connect attempt onto the refused / generic split
    pub fn from_connect(addr: impl Into<String>, source: std::io::Error) -> Self {
        let addr = addr.into();
        if source.kind() == std::io::ErrorKind::ConnectionRefused {
            BridgeError::ConnectionRefused { addr }
        } else {
            BridgeError::Connect { addr, source }
        }
    }

    /// Whether this error ends the whole session rather than a single direction
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, BridgeError::Transport { .. })
    }

    /// Whether the upstream listener could not be reached
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionRefused { .. } | BridgeError::Connect { .. }
        )
    }
}
