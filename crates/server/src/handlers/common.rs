//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use plinth_core::site_url;
use plinth_metadata::models::SiteRow;
use plinth_storage::SiteStats;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Maximum request body size for JSON endpoints (1 MiB).
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// A site as returned by the API.
#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub site_id: i64,
    pub identifier: String,
    pub url: String,
    pub owner_id: Option<i64>,
    pub original_filename: String,
    pub created_at: String,
    pub updated_at: String,
    /// Derived from the directory at request time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
}

impl SiteResponse {
    pub fn new(site: &SiteRow, base_domain: &str, stats: Option<SiteStats>) -> ApiResult<Self> {
        Ok(Self {
            site_id: site.site_id,
            identifier: site.identifier.clone(),
            url: site_url(&site.identifier, base_domain),
            owner_id: site.owner_id,
            original_filename: site.original_filename.clone(),
            created_at: format_timestamp(site.created_at, "created_at")?,
            updated_at: format_timestamp(site.updated_at, "updated_at")?,
            file_size: stats.map(|s| s.total_bytes),
            file_count: stats.map(|s| s.file_count),
        })
    }
}

/// Format a timestamp as RFC 3339.
pub fn format_timestamp(ts: OffsetDateTime, field: &str) -> ApiResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format {field}: {e}")))
}

/// Read and parse a JSON request body.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}
