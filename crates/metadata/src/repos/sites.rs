//! Site record repository.

use crate::error::MetadataResult;
use crate::models::{NewSite, SiteRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for site records.
///
/// Uniqueness of `identifier` and `storage_path` is enforced by the store
/// itself; writes that collide fail with `MetadataError::AlreadyExists`
/// rather than being pre-checked.
#[async_trait]
pub trait SiteRepo: Send + Sync {
    /// Insert a new site and return the stored row with its assigned id.
    async fn create_site(&self, site: &NewSite) -> MetadataResult<SiteRow>;

    /// Re-insert a previously deleted row, keeping its id and timestamps.
    async fn restore_site(&self, site: &SiteRow) -> MetadataResult<()>;

    async fn get_site(&self, site_id: i64) -> MetadataResult<Option<SiteRow>>;

    async fn get_site_by_identifier(&self, identifier: &str) -> MetadataResult<Option<SiteRow>>;

    /// All sites, newest first.
    async fn list_sites(&self) -> MetadataResult<Vec<SiteRow>>;

    /// Sites owned by one user, newest first.
    async fn list_sites_by_owner(&self, owner_id: i64) -> MetadataResult<Vec<SiteRow>>;

    /// Whether any record already uses `identifier`.
    async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool>;

    /// Change a site's identifier and storage path in one statement.
    async fn update_site_identity(
        &self,
        site_id: i64,
        identifier: &str,
        storage_path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    async fn delete_site(&self, site_id: i64) -> MetadataResult<()>;
}
