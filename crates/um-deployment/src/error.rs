//! Transport errors for deployment and shell sessions

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Host IP and Username are required in Settings to connect.")]
    MissingSettings,

    #[error("Failed to start ssh: {0}")]
    Spawn(String),

    #[error("Remote command '{command}' failed with exit code {code}: {stderr}")]
    RemoteCommand {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Connection timed out after {0}s")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
