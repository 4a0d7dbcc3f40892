//! Site upload, listing, rename and delete endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{SiteResponse, read_json};
use crate::metrics;
use crate::sites::{IngestRequest, SiteError};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use plinth_archive::{RejectionKind, ValidationError};
use plinth_core::token::TokenScope;
use plinth_metadata::models::SiteRow;
use plinth_metadata::repos::SiteRepo;
use serde::{Deserialize, Serialize};

/// Content types accepted for a raw archive body.
pub const ZIP_CONTENT_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
    "application/octet-stream",
];

/// Header carrying the archive's filename for raw uploads.
pub const FILENAME_HEADER: &str = "x-filename";

/// Filename assumed when the client does not send one.
pub const DEFAULT_FILENAME: &str = "site.zip";

/// Multipart field holding the archive.
const FILE_FIELD: &str = "file";

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub site_id: i64,
    pub identifier: String,
    pub url: String,
    pub original_filename: String,
}

/// A fully buffered archive body.
struct ReceivedArchive {
    filename: String,
    declared_len: u64,
    bytes: Bytes,
}

fn too_large(size: u64, limit: u64) -> ApiError {
    metrics::UPLOADS.with_label_values(&["rejected"]).inc();
    metrics::VALIDATION_REJECTIONS
        .with_label_values(&[RejectionKind::PayloadTooLarge.as_str()])
        .inc();
    SiteError::from(ValidationError::rejected(
        RejectionKind::PayloadTooLarge,
        format!("upload exceeds {limit} bytes (got at least {size})"),
    ))
    .into()
}

fn media_type(req: &Request) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read a raw archive body, refusing it as soon as it passes `limit`.
async fn read_raw_body(req: Request, limit: u64) -> ApiResult<ReceivedArchive> {
    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(len) = declared_len
        && len > limit
    {
        return Err(too_large(len, limit));
    }

    let filename = req
        .headers()
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_FILENAME)
        .to_string();

    let mut stream = req.into_body().into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        let received = (buf.len() + chunk.len()) as u64;
        if received > limit {
            return Err(too_large(received, limit));
        }
        buf.extend_from_slice(&chunk);
    }

    let bytes = buf.freeze();
    Ok(ReceivedArchive {
        filename,
        declared_len: declared_len.unwrap_or(bytes.len() as u64),
        bytes,
    })
}

fn multipart_error(e: MultipartError, limit: u64) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit.saturating_add(1), limit)
    } else {
        ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// Read the `file` field of a multipart form.
async fn read_multipart(
    state: &AppState,
    req: Request,
    limit: u64,
) -> ApiResult<ReceivedArchive> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text())))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
            let received = (buf.len() + chunk.len()) as u64;
            if received > limit {
                return Err(too_large(received, limit));
            }
            buf.extend_from_slice(&chunk);
        }

        let bytes = buf.freeze();
        return Ok(ReceivedArchive {
            filename,
            declared_len: bytes.len() as u64,
            bytes,
        });
    }

    Err(ApiError::BadRequest(format!(
        "multipart body has no '{FILE_FIELD}' field"
    )))
}

/// POST /v1/sites - Upload an archive and publish it as a new site.
///
/// Accepts a raw zip body (filename in `X-Filename`) or a multipart form
/// with a `file` field.
pub async fn upload_site(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(TokenScope::SitesWrite)?;

    let limit = state.config.server.max_upload_bytes;
    let media_type = media_type(&req);
    let received = if media_type == "multipart/form-data" {
        read_multipart(&state, req, limit).await?
    } else if ZIP_CONTENT_TYPES.contains(&media_type.as_str()) {
        read_raw_body(req, limit).await?
    } else {
        return Err(ApiError::UnsupportedMediaType(format!(
            "expected a zip archive or multipart/form-data, got '{media_type}'"
        )));
    };

    let outcome = state
        .ingestor
        .ingest(IngestRequest {
            owner_id: auth.token.user_id,
            filename: received.filename,
            declared_len: received.declared_len,
            bytes: received.bytes,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            site_id: outcome.site.site_id,
            identifier: outcome.site.identifier,
            url: outcome.url,
            original_filename: outcome.site.original_filename,
        }),
    ))
}

/// Query parameters for listing sites.
#[derive(Debug, Default, Deserialize)]
pub struct ListSitesQuery {
    /// List every site (admin only).
    #[serde(default)]
    pub all: bool,
}

async fn with_stats(state: &AppState, sites: &[SiteRow]) -> ApiResult<Vec<SiteResponse>> {
    let stats = futures::future::try_join_all(
        sites
            .iter()
            .map(|site| async move { state.storage.site_stats(&site.storage_path()).await }),
    )
    .await?;

    sites
        .iter()
        .zip(stats)
        .map(|(site, stats)| SiteResponse::new(site, &state.config.sites.base_domain, Some(stats)))
        .collect()
}

/// GET /v1/sites - List the caller's sites, newest first.
///
/// Admins may pass `?all=true`. The bootstrap admin token has no user and
/// always sees every site.
pub async fn list_sites(
    State(state): State<AppState>,
    Query(query): Query<ListSitesQuery>,
    req: Request,
) -> ApiResult<Json<Vec<SiteResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::SitesRead)?;

    let sites = match auth.token.user_id {
        Some(_) if query.all => {
            auth.require_scope(TokenScope::SitesAdmin)?;
            state.metadata.list_sites().await?
        }
        Some(user_id) => state.metadata.list_sites_by_owner(user_id).await?,
        None => {
            auth.require_scope(TokenScope::SitesAdmin)?;
            state.metadata.list_sites().await?
        }
    };

    Ok(Json(with_stats(&state, &sites).await?))
}

/// GET /v1/sites/{identifier} - Show one site.
pub async fn get_site(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    req: Request,
) -> ApiResult<Json<SiteResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::SitesRead)?;

    let site = state
        .metadata
        .get_site_by_identifier(&identifier)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("site not found: {identifier}")))?;
    if !auth.actor().may_manage(site.owner_id) {
        return Err(ApiError::Forbidden(format!(
            "site '{identifier}' belongs to another user"
        )));
    }

    let stats = state.storage.site_stats(&site.storage_path()).await?;
    Ok(Json(SiteResponse::new(
        &site,
        &state.config.sites.base_domain,
        Some(stats),
    )?))
}

/// Rename request.
#[derive(Debug, Deserialize)]
pub struct RenameSiteRequest {
    pub identifier: String,
}

/// PATCH /v1/sites/{identifier} - Move a site to a new identifier.
pub async fn rename_site(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    req: Request,
) -> ApiResult<Json<SiteResponse>> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(TokenScope::SitesWrite)?;

    let body: RenameSiteRequest = read_json(req).await?;
    let site = state
        .sites
        .rename(&auth.actor(), &identifier, body.identifier.trim())
        .await?;

    Ok(Json(SiteResponse::new(
        &site,
        &state.config.sites.base_domain,
        None,
    )?))
}

/// DELETE /v1/sites/{identifier} - Delete a site and its directory.
pub async fn delete_site(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::SitesWrite)?;

    state.sites.delete(&auth.actor(), &identifier).await?;
    Ok(StatusCode::NO_CONTENT)
}
