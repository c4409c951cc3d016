//! Durable, per-session memory of confirmed directories.

pub mod persistence;

pub use persistence::{ConfirmationRecord, ConfirmationStore, FileStore, MemoryStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session id: {id:?}")]
    InvalidSessionId { id: String },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(source),
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Rejects ids that cannot name a distinct storage location.
pub(crate) fn validate_session_id(id: &str) -> SessionResult<()> {
    if id.trim().is_empty() || id == "." || id == ".." {
        return Err(SessionError::InvalidSessionId { id: id.to_string() });
    }
    Ok(())
}
