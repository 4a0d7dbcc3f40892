//! Storage error types.

use thiserror::Error;

/// Site storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("site directory not found: {0}")]
    NotFound(String),

    #[error("site directory already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
