//! Administrative endpoints: users and their tokens.

use crate::auth::{hash_token, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{format_timestamp, read_json};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use plinth_core::token::TokenScope;
use plinth_metadata::models::TokenRow;
use plinth_metadata::repos::{TokenRepo, UserRepo};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum username length.
const MAX_USERNAME_LEN: usize = 64;

/// Create user request.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

/// A user as returned by the API.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub username: String,
    pub created_at: String,
}

/// Result of deleting a user.
#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub user_id: i64,
    pub sites_removed: usize,
    pub tokens_removed: u64,
}

/// Issue-token request. The token acts for `user_id`.
#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub user_id: i64,
    pub scopes: Vec<String>,
    /// Lifetime in seconds; omitted means no expiry.
    pub expires_in: Option<u64>,
    pub description: Option<String>,
}

/// A freshly issued token. The secret is shown only here.
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token_id: String,
    pub token_secret: String,
    pub expires_at: Option<String>,
}

/// Validate username format.
fn validate_username(name: &str) -> ApiResult<()> {
    if name.is_empty() || name.len() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "username must be 1-{MAX_USERNAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::BadRequest(
            "username may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// POST /v1/admin/users - Create a user.
pub async fn create_user(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::SitesAdmin)?;

    let body: CreateUserRequest = read_json(req).await?;
    let username = body.username.trim();
    validate_username(username)?;

    let user = match state.metadata.create_user(username).await {
        Ok(user) => user,
        Err(e) if e.is_already_exists() => {
            return Err(ApiError::Conflict(format!("username already taken: {username}")));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = user.user_id, username = %user.username, "User created");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user_id: user.user_id,
            username: user.username,
            created_at: format_timestamp(user.created_at, "created_at")?,
        }),
    ))
}

/// DELETE /v1/admin/users/{user_id} - Delete a user, their sites and tokens.
///
/// Sites are removed one by one; the first failure stops the cascade and the
/// user is kept.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    req: Request,
) -> ApiResult<Json<DeleteUserResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::SitesAdmin)?;

    if state.metadata.get_user(user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("user not found: {user_id}")));
    }

    let sites_removed = state.sites.delete_user_sites(user_id).await?;
    // A site uploaded after the cascade fails the delete and keeps the tokens.
    let tokens_removed = state.metadata.delete_user(user_id).await?;

    tracing::info!(user_id, sites_removed, tokens_removed, "User deleted");

    Ok(Json(DeleteUserResponse {
        user_id,
        sites_removed,
        tokens_removed,
    }))
}

/// POST /v1/admin/tokens - Issue a token for a user.
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateTokenResponse>)> {
    let auth = require_auth(&req)?;
    auth.require_scope(TokenScope::SitesAdmin)?;

    let body: CreateTokenRequest = read_json(req).await?;

    if body.scopes.is_empty() {
        return Err(ApiError::BadRequest("at least one scope is required".to_string()));
    }
    // Reject unknown scopes before storing
    for scope in &body.scopes {
        TokenScope::parse(scope)
            .map_err(|_| ApiError::BadRequest(format!("invalid scope: {scope}")))?;
    }

    if state.metadata.get_user(body.user_id).await?.is_none() {
        return Err(ApiError::BadRequest(format!("user not found: {}", body.user_id)));
    }

    let token_secret = generate_token_secret();
    let now = OffsetDateTime::now_utc();
    let expires_at = match body.expires_in {
        Some(secs) => {
            let secs_i64: i64 = secs.try_into().map_err(|_| {
                ApiError::BadRequest(format!("expires_in too large: {secs}"))
            })?;
            Some(now + time::Duration::seconds(secs_i64))
        }
        None => None,
    };

    let scopes_json = serde_json::to_string(&body.scopes)
        .map_err(|e| ApiError::Internal(format!("failed to serialize scopes: {e}")))?;

    let token_row = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: Some(body.user_id),
        token_hash: hash_token(&token_secret),
        scopes: scopes_json,
        expires_at,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: body.description,
    };
    state.metadata.create_token(&token_row).await?;
    tracing::info!(
        token_id = %token_row.token_id,
        user_id = body.user_id,
        "Token issued"
    );

    let expires_at = expires_at
        .map(|t| format_timestamp(t, "expires_at"))
        .transpose()?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            token_id: token_row.token_id.to_string(),
            token_secret,
            expires_at,
        }),
    ))
}

/// Generate a random token secret (32 bytes, hex encoded).
fn generate_token_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
