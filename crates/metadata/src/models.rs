//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Sites
// =============================================================================

/// Durable mapping from a site identifier to its directory and owner.
///
/// `identifier` and `storage_path` are each unique across the table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SiteRow {
    pub site_id: i64,
    pub owner_id: Option<i64>,
    pub identifier: String,
    pub storage_path: String,
    pub original_filename: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SiteRow {
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_path)
    }
}

/// Fields supplied by the caller when creating a site; the store assigns
/// the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub owner_id: Option<i64>,
    pub identifier: String,
    pub storage_path: String,
    pub original_filename: String,
}

// =============================================================================
// Users and tokens
// =============================================================================

/// Minimal user record. Sites and tokens hang off `user_id`.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub created_at: OffsetDateTime,
}

/// API token record. Only the SHA-256 of the secret is stored.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub user_id: Option<i64>,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
