//! Test doubles for the routing hook, site storage and metadata store.

use async_trait::async_trait;
use plinth_archive::ValidatedArchive;
use plinth_core::SiteIdentifier;
use plinth_metadata::models::{NewSite, SiteRow, TokenRow, UserRow};
use plinth_metadata::repos::{BootstrapRepo, SiteRepo, TokenRepo, UserRepo};
use plinth_metadata::{MetadataError, MetadataResult, MetadataStore};
use plinth_server::routing::{ReloadError, RouteReloader};
use plinth_storage::{SiteStats, SiteStorage, StorageError, StorageResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Counts reload signals.
#[derive(Default)]
pub struct RecordingReloader {
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingReloader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Reloads run detached; poll until `n` have been seen.
    pub async fn wait_for(&self, n: usize) -> bool {
        for _ in 0..100 {
            if self.calls() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl RouteReloader for RecordingReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wraps real storage and can be told to fail individual operations.
pub struct FaultyStorage {
    inner: Arc<dyn SiteStorage>,
    pub fail_remove: AtomicBool,
    pub fail_move: AtomicBool,
    /// Number of upcoming `materialize` calls that report an existing directory.
    pub materialize_conflicts: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyStorage {
    pub fn new(inner: Arc<dyn SiteStorage>) -> Self {
        Self {
            inner,
            fail_remove: AtomicBool::new(false),
            fail_move: AtomicBool::new(false),
            materialize_conflicts: AtomicUsize::new(0),
        }
    }
}

fn injected(op: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        format!("injected {op} failure"),
    ))
}

#[async_trait]
impl SiteStorage for FaultyStorage {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn scratch_dir(&self) -> &Path {
        self.inner.scratch_dir()
    }

    fn site_path(&self, identifier: &SiteIdentifier) -> StorageResult<PathBuf> {
        self.inner.site_path(identifier)
    }

    async fn materialize(
        &self,
        archive_path: &Path,
        archive: &ValidatedArchive,
        identifier: &SiteIdentifier,
    ) -> StorageResult<PathBuf> {
        let pending = self.materialize_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.materialize_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::AlreadyExists(
                self.inner.site_path(identifier)?.display().to_string(),
            ));
        }
        self.inner.materialize(archive_path, archive, identifier).await
    }

    async fn move_site(&self, from: &Path, to: &Path) -> StorageResult<()> {
        if self.fail_move.load(Ordering::SeqCst) {
            return Err(injected("move"));
        }
        self.inner.move_site(from, to).await
    }

    async fn remove_site(&self, path: &Path) -> StorageResult<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(injected("remove"));
        }
        self.inner.remove_site(path).await
    }

    async fn site_stats(&self, path: &Path) -> StorageResult<SiteStats> {
        self.inner.site_stats(path).await
    }

    async fn cleanup_scratch(&self, max_age: Duration) -> StorageResult<usize> {
        self.inner.cleanup_scratch(max_age).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}

/// Wraps a real metadata store and can be told to fail individual writes.
pub struct FaultyMetadata {
    inner: Arc<dyn MetadataStore>,
    pub fail_create_site: AtomicBool,
    pub fail_update_site: AtomicBool,
    /// Owner listings come back empty, as if every site appeared after the read.
    pub hide_owned_sites: AtomicBool,
}

#[allow(dead_code)]
impl FaultyMetadata {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner,
            fail_create_site: AtomicBool::new(false),
            fail_update_site: AtomicBool::new(false),
            hide_owned_sites: AtomicBool::new(false),
        }
    }
}

fn injected_write(op: &str) -> MetadataError {
    MetadataError::Internal(format!("injected {op} failure"))
}

#[async_trait]
impl SiteRepo for FaultyMetadata {
    async fn create_site(&self, site: &NewSite) -> MetadataResult<SiteRow> {
        if self.fail_create_site.load(Ordering::SeqCst) {
            return Err(injected_write("create_site"));
        }
        self.inner.create_site(site).await
    }

    async fn restore_site(&self, site: &SiteRow) -> MetadataResult<()> {
        self.inner.restore_site(site).await
    }

    async fn get_site(&self, site_id: i64) -> MetadataResult<Option<SiteRow>> {
        self.inner.get_site(site_id).await
    }

    async fn get_site_by_identifier(&self, identifier: &str) -> MetadataResult<Option<SiteRow>> {
        self.inner.get_site_by_identifier(identifier).await
    }

    async fn list_sites(&self) -> MetadataResult<Vec<SiteRow>> {
        self.inner.list_sites().await
    }

    async fn list_sites_by_owner(&self, owner_id: i64) -> MetadataResult<Vec<SiteRow>> {
        if self.hide_owned_sites.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.list_sites_by_owner(owner_id).await
    }

    async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool> {
        self.inner.identifier_exists(identifier).await
    }

    async fn update_site_identity(
        &self,
        site_id: i64,
        identifier: &str,
        storage_path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        if self.fail_update_site.load(Ordering::SeqCst) {
            return Err(injected_write("update_site_identity"));
        }
        self.inner
            .update_site_identity(site_id, identifier, storage_path, updated_at)
            .await
    }

    async fn delete_site(&self, site_id: i64) -> MetadataResult<()> {
        self.inner.delete_site(site_id).await
    }
}

#[async_trait]
impl UserRepo for FaultyMetadata {
    async fn create_user(&self, username: &str) -> MetadataResult<UserRow> {
        self.inner.create_user(username).await
    }

    async fn get_user(&self, user_id: i64) -> MetadataResult<Option<UserRow>> {
        self.inner.get_user(user_id).await
    }

    async fn list_users(&self) -> MetadataResult<Vec<UserRow>> {
        self.inner.list_users().await
    }

    async fn delete_user(&self, user_id: i64) -> MetadataResult<u64> {
        self.inner.delete_user(user_id).await
    }
}

#[async_trait]
impl TokenRepo for FaultyMetadata {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        self.inner.create_token(token).await
    }

    async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
        self.inner.get_token_by_hash(token_hash).await
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        self.inner.get_token(token_id).await
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        self.inner.touch_token(token_id, used_at).await
    }

    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()> {
        self.inner.revoke_token(token_id, revoked_at).await
    }
}

#[async_trait]
impl BootstrapRepo for FaultyMetadata {
    async fn bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
        self.inner.bootstrap_token_id().await
    }

    async fn record_bootstrap_token(&self, token_id: Uuid) -> MetadataResult<()> {
        self.inner.record_bootstrap_token(token_id).await
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
