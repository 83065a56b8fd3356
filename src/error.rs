use crate::domain::session::SessionId;
use crate::domain::verification::VerificationId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Verification failed for {reference}: {message}")]
    VerificationFailed { reference: String, message: String },
    #[error("Timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },
    #[error("Polling session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("Verification not found: {0}")]
    VerificationNotFound(VerificationId),
    #[error("Nothing is being monitored for {0}")]
    NotMonitored(String),
    #[error("Unknown resource category: {0}")]
    UnknownCategory(String),
    #[error("Invalid script row: {0}")]
    InvalidScript(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl WatchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
