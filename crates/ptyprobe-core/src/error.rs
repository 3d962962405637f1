//! Error types for ptyprobe.

use thiserror::Error;

/// Main error type for ptyprobe operations.
#[derive(Debug, Error)]
pub enum Error {
    /// PTY-related errors (pair creation, descriptor setup)
    #[error("PTY error: {0}")]
    Pty(String),

    /// The target program could not be started
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn {
        /// Program that was requested
        program: String,
        /// Underlying cause
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
