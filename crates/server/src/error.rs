//! API error types.

use crate::sites::SiteError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use plinth_archive::{Rejection, RejectionKind};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Every offending archive entry, for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejections: Option<Vec<Rejection>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("storage error: {0}")]
    Storage(#[from] plinth_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] plinth_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] plinth_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Internal(_) => "internal_error",
            Self::Site(e) => e.code(),
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Site(e) => site_status(e),
            Self::Storage(e) => match e {
                plinth_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                plinth_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                plinth_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                plinth_metadata::MetadataError::Constraint(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn rejections(&self) -> Option<Vec<Rejection>> {
        match self {
            Self::Site(SiteError::Validation(e)) => Some(e.rejections.clone()),
            _ => None,
        }
    }
}

fn site_status(err: &SiteError) -> StatusCode {
    match err {
        SiteError::Validation(e) => match e.primary_kind() {
            RejectionKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        },
        SiteError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
        SiteError::NotFound(_) => StatusCode::NOT_FOUND,
        SiteError::Forbidden(_) => StatusCode::FORBIDDEN,
        SiteError::IdentifierTaken(_) => StatusCode::CONFLICT,
        SiteError::CascadeAborted { source, .. } => site_status(source),
        SiteError::ExtractionFailed(_)
        | SiteError::RecordPersistFailed(_)
        | SiteError::DirectoryRemovalFailed { .. }
        | SiteError::Storage(_)
        | SiteError::Metadata(_)
        | SiteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            rejections: self.rejections(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
