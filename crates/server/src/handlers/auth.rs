//! Authentication-related endpoints.

use crate::auth::require_auth;
use crate::error::ApiResult;
use crate::handlers::common::format_timestamp;
use axum::Json;
use axum::extract::Request;
use serde::Serialize;

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub token_id: String,
    pub user_id: Option<i64>,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
}

/// GET /v1/auth/whoami - Return token identity.
pub async fn whoami(req: Request) -> ApiResult<Json<WhoamiResponse>> {
    let auth = require_auth(&req)?;
    let token = &auth.token;

    let mut scopes: Vec<String> = token
        .scopes
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    scopes.sort();

    let expires_at = token
        .expires_at
        .map(|ts| format_timestamp(ts, "expires_at"))
        .transpose()?;

    Ok(Json(WhoamiResponse {
        token_id: token.id.to_string(),
        user_id: token.user_id,
        scopes,
        expires_at,
    }))
}
