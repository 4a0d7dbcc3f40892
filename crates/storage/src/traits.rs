//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use plinth_archive::ValidatedArchive;
use plinth_core::SiteIdentifier;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Size and file count of a site directory, computed on demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SiteStats {
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Directory-level operations on materialized sites.
///
/// Every path accepted or returned by an implementation lives directly under
/// [`SiteStorage::root`]; paths anywhere else are refused with
/// `StorageError::InvalidPath`.
#[async_trait]
pub trait SiteStorage: Send + Sync {
    /// Directory every site lives under.
    fn root(&self) -> &Path;

    /// Directory for in-flight upload buffers.
    fn scratch_dir(&self) -> &Path;

    /// Canonical directory for an identifier.
    fn site_path(&self, identifier: &SiteIdentifier) -> StorageResult<PathBuf>;

    /// Extract a validated archive into a new directory for `identifier`.
    ///
    /// Fails with `AlreadyExists` if the directory is already present. On any
    /// failure the partially written directory is removed before returning.
    async fn materialize(
        &self,
        archive_path: &Path,
        archive: &ValidatedArchive,
        identifier: &SiteIdentifier,
    ) -> StorageResult<PathBuf>;

    /// Move a site directory. `from` must exist and `to` must not.
    async fn move_site(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Remove a site directory. Succeeds if it is already gone.
    async fn remove_site(&self, path: &Path) -> StorageResult<()>;

    /// Walk a site directory. A missing directory reports zeros.
    async fn site_stats(&self, path: &Path) -> StorageResult<SiteStats>;

    /// Delete scratch files older than `max_age`. Returns how many were removed.
    async fn cleanup_scratch(&self, max_age: Duration) -> StorageResult<usize>;

    /// Check that the root is present and writable.
    async fn health_check(&self) -> StorageResult<()>;
}
