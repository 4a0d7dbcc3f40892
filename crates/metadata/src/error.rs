//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique column (site identifier, storage path, username, token hash)
    /// already holds the value being written.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// True when the error reports a unique-key collision.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Recognize unique violations from either backend.
///
/// PostgreSQL reports SQLSTATE 23505; SQLite reports
/// "UNIQUE constraint failed: <table>.<column>".
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                || db_err.message().contains("UNIQUE constraint")
        }
        _ => false,
    }
}

/// Recognize foreign-key violations from either backend.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23503")
                || db_err.message().contains("FOREIGN KEY constraint")
        }
        _ => false,
    }
}

/// Map a write error, turning unique violations into `AlreadyExists` and
/// foreign-key violations into `Constraint`.
pub(crate) fn map_write_error(err: sqlx::Error, what: impl FnOnce() -> String) -> MetadataError {
    if is_unique_violation(&err) {
        MetadataError::AlreadyExists(what())
    } else if is_foreign_key_violation(&err) {
        MetadataError::Constraint(what())
    } else {
        MetadataError::Database(err)
    }
}
