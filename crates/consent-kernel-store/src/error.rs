//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Column encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A write-once row already exists.
    #[error("conflict: {0} already stored")]
    Conflict(String),

    /// A stored row does not decode into a valid value.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The connection lock or a blocking task failed.
    #[error("task error: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn invalid(what: impl std::fmt::Display) -> Self {
        StoreError::InvalidData(what.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
