//! Error types for evsync.

use thiserror::Error;

/// Errors that can occur while reading, reconciling or writing events.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DAV request to {url} failed with status {status}")]
    DavStatus { url: String, status: u16 },

    #[error("DAV response error: {0}")]
    DavResponse(String),

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    #[error("Invalid event payload: {0}")]
    Payload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn timestamp(value: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Timestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for evsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
