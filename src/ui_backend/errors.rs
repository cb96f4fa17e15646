//! Typed errors for collaborator services
//!
//! Each collaborator has its own error type. None of them ever escapes the
//! reducer; they are turned into status messages or failed block markers.

use thiserror::Error;

/// Errors from the session-control API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Push stream closed")]
    StreamClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the app-state store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid state file: {0}")]
    InvalidStateFile(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
