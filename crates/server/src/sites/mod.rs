//! Site pipeline: identifier allocation, record/directory lifecycle and
//! upload ingestion.
//!
//! The record store and the sites directory are updated in two separate
//! steps. Every operation here orders those steps so that a failure leaves
//! at worst a record without a directory, never a directory nobody owns.

pub mod allocator;
pub mod ingest;
pub mod lifecycle;

pub use allocator::IdentifierAllocator;
pub use ingest::{IngestOutcome, IngestRequest, Ingestor};
pub use lifecycle::SiteLifecycle;

pub use plinth_core::token::Actor;

use plinth_archive::ValidationError;
use plinth_metadata::MetadataError;
use plinth_storage::StorageError;

/// Failures of the site pipeline.
///
/// Identifier collisions and pre-existing target directories never appear
/// here; they are retried with a fresh identifier.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("site not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("identifier already taken: {0}")]
    IdentifierTaken(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("failed to persist site record: {0}")]
    RecordPersistFailed(#[source] MetadataError),

    /// The record was deleted, the directory could not be, and the record
    /// has been put back.
    #[error("failed to remove directory of site '{identifier}': {reason}")]
    DirectoryRemovalFailed { identifier: String, reason: String },

    #[error("{source} ({removed} site(s) removed before the failure)")]
    CascadeAborted {
        removed: usize,
        source: Box<SiteError>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SiteError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.primary_kind().as_str(),
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::IdentifierTaken(_) => "identifier_taken",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::RecordPersistFailed(_) => "record_persist_failed",
            Self::DirectoryRemovalFailed { .. } => "directory_removal_failed",
            Self::CascadeAborted { source, .. } => source.code(),
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> SiteError {
    SiteError::Internal(format!("blocking task failed: {e}"))
}
