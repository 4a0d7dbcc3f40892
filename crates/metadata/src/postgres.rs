//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, map_write_error};
use crate::models::*;
use crate::repos::{BootstrapRepo, SiteRepo, TokenRepo, UserRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use plinth_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters,
    /// so the password can come from its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements carry one command each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SiteRepo for PostgresStore {
    async fn create_site(&self, site: &NewSite) -> MetadataResult<SiteRow> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, SiteRow>(
            r#"
            INSERT INTO sites (
                owner_id, identifier, storage_path, original_filename,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
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
        let row = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites WHERE site_id = $1")
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_site_by_identifier(&self, identifier: &str) -> MetadataResult<Option<SiteRow>> {
        let row = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites WHERE identifier = $1")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_sites(&self) -> MetadataResult<Vec<SiteRow>> {
        let rows =
            sqlx::query_as::<_, SiteRow>("SELECT * FROM sites ORDER BY created_at DESC, site_id DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn list_sites_by_owner(&self, owner_id: i64) -> MetadataResult<Vec<SiteRow>> {
        let rows = sqlx::query_as::<_, SiteRow>(
            "SELECT * FROM sites WHERE owner_id = $1 ORDER BY created_at DESC, site_id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sites WHERE identifier = $1)")
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
            "UPDATE sites SET identifier = $1, storage_path = $2, updated_at = $3 WHERE site_id = $4",
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
        let result = sqlx::query("DELETE FROM sites WHERE site_id = $1")
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
impl UserRepo for PostgresStore {
    async fn create_user(&self, username: &str) -> MetadataResult<UserRow> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, created_at) VALUES ($1, $2) RETURNING *",
        )
        .bind(username)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, || format!("user '{username}'")))
    }

    async fn get_user(&self, user_id: i64) -> MetadataResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
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

        let tokens = sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
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
impl TokenRepo for PostgresStore {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, user_id, token_hash, scopes, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $1 WHERE token_id = $2")
            .bind(used_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET revoked_at = $1 WHERE token_id = $2")
            .bind(revoked_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BootstrapRepo for PostgresStore {
    async fn bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
        // Outer None: no row. Inner None: row with a NULL marker.
        let value: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn record_bootstrap_token(&self, token_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bootstrap_state (id, bootstrap_token_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_token_id = EXCLUDED.bootstrap_token_id
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
