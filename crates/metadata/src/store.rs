//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BootstrapRepo, SiteRepo, TokenRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: SiteRepo + UserRepo + TokenRepo + BootstrapRepo + Send + Sync {
    /// Create tables and indexes if they do not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    ///
    /// `":memory:"` gives a private in-memory database, which is what the
    /// tests use.
    pub async fn new(
        path: impl AsRef<Path>,
        busy_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("create {}: {e}", parent.display())))?;
        }

        let busy_timeout = busy_timeout_secs.map_or(Duration::from_secs(5), Duration::from_secs);
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        // One connection serializes writers; with more, concurrent uploads
        // surface "database is locked" instead of waiting.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "SQLite metadata store ready");

        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::error::map_write_error;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl SiteRepo for SqliteStore {
        async fn create_site(&self, site: &NewSite) -> MetadataResult<SiteRow> {
            let now = OffsetDateTime::now_utc();
            sqlx::query_as::<_, SiteRow>(
                r#"
                INSERT INTO sites (
                    owner_id, identifier, storage_path, original_filename,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(site.owner_id)
            .bind(&site.identifier)
            .bind(&site.storage_path)
            .bind(&site.original_filename)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("site '{}'", site.identifier)))
        }

        async fn restore_site(&self, site: &SiteRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sites (
                    site_id, owner_id, identifier, storage_path, original_filename,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(site.site_id)
            .bind(site.owner_id)
            .bind(&site.identifier)
            .bind(&site.storage_path)
            .bind(&site.original_filename)
            .bind(site.created_at)
            .bind(site.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("site '{}'", site.identifier)))?;
            Ok(())
        }

        async fn get_site(&self, site_id: i64) -> MetadataResult<Option<SiteRow>> {
            let row = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites WHERE site_id = ?")
                .bind(site_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_site_by_identifier(
            &self,
            identifier: &str,
        ) -> MetadataResult<Option<SiteRow>> {
            let row = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites WHERE identifier = ?")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_sites(&self) -> MetadataResult<Vec<SiteRow>> {
            let rows = sqlx::query_as::<_, SiteRow>(
                "SELECT * FROM sites ORDER BY created_at DESC, site_id DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_sites_by_owner(&self, owner_id: i64) -> MetadataResult<Vec<SiteRow>> {
            let rows = sqlx::query_as::<_, SiteRow>(
                "SELECT * FROM sites WHERE owner_id = ? ORDER BY created_at DESC, site_id DESC",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sites WHERE identifier = ?)")
                    .bind(identifier)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn update_site_identity(
            &self,
            site_id: i64,
            identifier: &str,
            storage_path: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE sites SET identifier = ?, storage_path = ?, updated_at = ? WHERE site_id = ?",
            )
            .bind(identifier)
            .bind(storage_path)
            .bind(updated_at)
            .bind(site_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("site '{identifier}'")))?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("site_id {site_id} not found")));
            }
            Ok(())
        }

        async fn delete_site(&self, site_id: i64) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM sites WHERE site_id = ?")
                .bind(site_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("site_id {site_id} not found")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, username: &str) -> MetadataResult<UserRow> {
            sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (username, created_at) VALUES (?, ?) RETURNING *",
            )
            .bind(username)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("user '{username}'")))
        }

        async fn get_user(&self, user_id: i64) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_users(&self) -> MetadataResult<Vec<UserRow>> {
            let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn delete_user(&self, user_id: i64) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            let tokens = sqlx::query("DELETE FROM tokens WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            // Dropping the transaction on error rolls the token delete back
            let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, || format!("user_id {user_id} still referenced")))?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user_id {user_id} not found")));
            }

            tx.commit().await?;
            Ok(tokens.rows_affected())
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, user_id, token_hash, scopes, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(&token.scopes)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("token {}", token.token_id)))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn record_bootstrap_token(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- AUTOINCREMENT keeps deleted site ids from being handed out again, so a
-- restored row never collides with a newer site.
CREATE TABLE IF NOT EXISTS sites (
    site_id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER REFERENCES users(user_id),
    identifier TEXT NOT NULL UNIQUE,
    storage_path TEXT NOT NULL UNIQUE,
    original_filename TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sites_owner ON sites(owner_id);
CREATE INDEX IF NOT EXISTS idx_sites_created ON sites(created_at);

CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    user_id INTEGER REFERENCES users(user_id),
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
"#;
