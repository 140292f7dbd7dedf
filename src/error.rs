//! Error types for the store boundary and the login-item collaborator.
//!
//! Everything else in the app uses `anyhow`.

use thiserror::Error;

/// Failure while serializing or writing the history.
///
/// Never fatal: mutations log it and carry on.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while installing or removing the LaunchAgent.
#[derive(Error, Debug)]
pub enum ExternalServiceError {
    #[error("could not locate the home directory")]
    NoHomeDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("launchctl exited with status {status}: {output}")]
    Launchctl { status: i32, output: String },
}
