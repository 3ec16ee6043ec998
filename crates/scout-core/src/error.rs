//! Error types for scout-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using scout-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scout-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote server error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A single remote record could not be decoded
    #[error("Malformed remote record {}: {reason}", remote_id.as_deref().unwrap_or("<unknown>"))]
    MalformedRecord {
        remote_id: Option<String>,
        reason: String,
    },
}

impl Error {
    /// Build a [`Error::MalformedRecord`] for the given remote id.
    pub fn malformed(remote_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            remote_id: remote_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}
