//! Error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced container or backup does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation requires a running container
    #[error("Container is not running: {0}")]
    NotRunning(String),

    /// Container engine or socket unreachable
    #[error("Container engine error: {0}")]
    Transport(String),

    /// Exec or shell command reported failure
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Malformed user input
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Short label used as the title of error replies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "Not Found",
            Error::NotRunning(_) => "Not Running",
            Error::Transport(_) => "Engine Unreachable",
            Error::CommandFailed(_) => "Command Failed",
            Error::Validation(_) => "Invalid Input",
            Error::Timeout(_) => "Timeout",
            Error::ConfigError(_) => "Configuration Error",
            Error::NotificationError(_) => "Notification Error",
            Error::IoError(_) => "I/O Error",
            Error::SerializationError(_) => "Serialization Error",
            Error::Other(_) => "Error",
        }
    }
}

// Convert anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
