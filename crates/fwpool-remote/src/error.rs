//! Error types for the remote configuration client.

use thiserror::Error;

/// Result type alias for remote configuration operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors raised by the remote configuration client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// All bounded connect attempts failed.
    #[error("failed to connect to {host} after {attempts} attempts: {reason}")]
    Connect {
        host: String,
        attempts: u32,
        reason: String,
    },

    /// The appliance rejected the supplied credentials.
    #[error("authentication rejected by {host}")]
    Auth { host: String },

    /// A blocking operation exceeded its timeout.
    #[error("timed out during {operation}")]
    Timeout { operation: String },

    /// The device reported a configuration failure. Carries the literal
    /// response so operators see exactly what the appliance said.
    #[error("command {command:?} failed on device: {response}")]
    Command { command: String, response: String },

    /// File transfer to the appliance failed.
    #[error("failed to transfer file to {path}: {reason}")]
    Transfer { path: String, reason: String },

    /// SSH transport failure (dropped connection, protocol error).
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<russh::Error> for RemoteError {
    fn from(err: russh::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}
