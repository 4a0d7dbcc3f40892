//! Local filesystem site storage.

use crate::error::{StorageError, StorageResult};
use crate::materialize::materialize_sync;
use crate::ownership::OwnershipPolicy;
use crate::traits::{SiteStats, SiteStorage};
use crate::SCRATCH_PREFIX;
use async_trait::async_trait;
use plinth_archive::{ValidatedArchive, sanitize};
use plinth_core::SiteIdentifier;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Sites stored as directories directly under a single root.
pub struct FilesystemSites {
    root: PathBuf,
    scratch: PathBuf,
    ownership: Arc<OwnershipPolicy>,
}

impl FilesystemSites {
    /// Create the backend, creating the root and scratch directories if needed.
    pub async fn new(
        root: impl AsRef<Path>,
        scratch: impl AsRef<Path>,
        ownership: OwnershipPolicy,
    ) -> StorageResult<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        fs::create_dir_all(scratch.as_ref()).await?;
        // Stored paths are compared against the canonical root.
        let root = fs::canonicalize(root.as_ref()).await?;
        let scratch = fs::canonicalize(scratch.as_ref()).await?;
        Ok(Self {
            root,
            scratch,
            ownership: Arc::new(ownership),
        })
    }

    /// Validate a site path off the async runtime.
    async fn checked_path(&self, path: &Path) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::checked_path_sync(&root, &path))
            .await
            .map_err(StorageError::join)?
    }

    /// A site path must be exactly one normal component below the root, and
    /// if it exists it must be a real directory that resolves inside the root.
    fn checked_path_sync(root: &Path, path: &Path) -> StorageResult<PathBuf> {
        let outside = || {
            StorageError::InvalidPath(format!(
                "{} is not a site directory under {}",
                path.display(),
                root.display()
            ))
        };

        if path.parent() != Some(root) || !sanitize::is_within(root, path) {
            return Err(outside());
        }
        if !matches!(path.components().next_back(), Some(Component::Normal(_))) {
            return Err(outside());
        }

        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    return Err(StorageError::InvalidPath(format!(
                        "site directory is a symlink: {}",
                        path.display()
                    )));
                }
                let canonical = path.canonicalize()?;
                if !canonical.starts_with(root) {
                    return Err(StorageError::InvalidPath(format!(
                        "resolved path escapes sites root: {}",
                        path.display()
                    )));
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StorageError::Io(std::io::Error::new(
                    err.kind(),
                    format!("failed to stat site path: {err}"),
                )));
            }
        }

        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl SiteStorage for FilesystemSites {
    fn root(&self) -> &Path {
        &self.root
    }

    fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    fn site_path(&self, identifier: &SiteIdentifier) -> StorageResult<PathBuf> {
        sanitize::resolve_within(&self.root, Path::new(identifier.as_str())).ok_or_else(|| {
            StorageError::InvalidPath(format!("identifier does not map under root: {identifier}"))
        })
    }

    #[instrument(skip(self, archive), fields(backend = "filesystem", entries = archive.entries().len()))]
    async fn materialize(
        &self,
        archive_path: &Path,
        archive: &ValidatedArchive,
        identifier: &SiteIdentifier,
    ) -> StorageResult<PathBuf> {
        let target = self.checked_path(&self.site_path(identifier)?).await?;

        let archive_path = archive_path.to_path_buf();
        let archive = archive.clone();
        let ownership = Arc::clone(&self.ownership);
        let dest = target.clone();
        tokio::task::spawn_blocking(move || {
            materialize_sync(&archive_path, &archive, &dest, &ownership)
        })
        .await
        .map_err(StorageError::join)??;

        Ok(target)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn move_site(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let from = self.checked_path(from).await?;
        let to = self.checked_path(to).await?;

        if !fs::try_exists(&from).await? {
            return Err(StorageError::NotFound(from.display().to_string()));
        }
        if fs::symlink_metadata(&to).await.is_ok() {
            return Err(StorageError::AlreadyExists(to.display().to_string()));
        }

        // Same parent directory, so this is a single atomic rename.
        fs::rename(&from, &to).await?;
        debug!(from = %from.display(), to = %to.display(), "site directory moved");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn remove_site(&self, path: &Path) -> StorageResult<()> {
        let path = self.checked_path(path).await?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn site_stats(&self, path: &Path) -> StorageResult<SiteStats> {
        let path = self.checked_path(path).await?;
        tokio::task::spawn_blocking(move || {
            let mut stats = SiteStats::default();
            if !path.exists() {
                return Ok(stats);
            }
            for entry in WalkDir::new(&path).follow_links(false) {
                let entry = entry.map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
                if entry.file_type().is_file() {
                    let meta = entry
                        .metadata()
                        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
                    stats.total_bytes += meta.len();
                    stats.file_count += 1;
                }
            }
            Ok(stats)
        })
        .await
        .map_err(StorageError::join)?
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn cleanup_scratch(&self, max_age: Duration) -> StorageResult<usize> {
        let mut removed = 0;
        let now = SystemTime::now();
        let mut entries = fs::read_dir(&self.scratch).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(SCRATCH_PREFIX) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove scratch file"),
            }
        }
        Ok(removed)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("sites root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("sites root is not a directory: {:?}", self.root),
            )));
        }
        if metadata.permissions().readonly() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("sites root is read-only: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
