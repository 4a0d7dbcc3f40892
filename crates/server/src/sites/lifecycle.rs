//! Create, rename and delete of site records together with their directories.

use super::{Actor, IdentifierAllocator, SiteError};
use crate::metrics;
use crate::routing::{RouteReloader, spawn_reload};
use plinth_archive::ValidatedArchive;
use plinth_core::SiteIdentifier;
use plinth_metadata::models::{NewSite, SiteRow};
use plinth_metadata::repos::SiteRepo;
use plinth_metadata::{MetadataError, MetadataStore};
use plinth_storage::{SiteStorage, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

/// Coordinates the record store and the sites directory.
pub struct SiteLifecycle {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn SiteStorage>,
    allocator: IdentifierAllocator,
    reloader: Arc<dyn RouteReloader>,
}

impl SiteLifecycle {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn SiteStorage>,
        allocator: IdentifierAllocator,
        reloader: Arc<dyn RouteReloader>,
    ) -> Self {
        Self {
            metadata,
            storage,
            allocator,
            reloader,
        }
    }

    /// Signal the routing collaborator without waiting for it.
    pub fn request_reload(&self, reason: &'static str) {
        spawn_reload(Arc::clone(&self.reloader), reason);
    }

    /// Materialize `archive` under a fresh identifier and record it.
    ///
    /// A directory that already exists or an identifier that loses the race
    /// on the UNIQUE constraint is retried with a new identifier. Any other
    /// failure after extraction removes the directory before returning.
    #[instrument(skip(self, archive_path, archive), fields(entries = archive.entries().len()))]
    pub async fn create_with_retry(
        &self,
        owner_id: Option<i64>,
        original_filename: &str,
        archive_path: &Path,
        archive: &ValidatedArchive,
    ) -> Result<SiteRow, SiteError> {
        let (mut identifier, mut path) = self.materialize_fresh(archive_path, archive).await?;

        loop {
            let storage_path = match path_str(&path) {
                Ok(s) => s.to_string(),
                Err(e) => {
                    self.discard(&path).await;
                    return Err(e);
                }
            };
            let new_site = NewSite {
                owner_id,
                identifier: identifier.to_string(),
                storage_path,
                original_filename: original_filename.to_string(),
            };

            match self.metadata.create_site(&new_site).await {
                Ok(row) => {
                    info!(
                        site_id = row.site_id,
                        identifier = %row.identifier,
                        owner_id = ?row.owner_id,
                        "Site created"
                    );
                    return Ok(row);
                }
                Err(MetadataError::AlreadyExists(detail)) => {
                    metrics::IDENTIFIER_COLLISIONS
                        .with_label_values(&["insert"])
                        .inc();
                    warn!(
                        identifier = %identifier,
                        detail = %detail,
                        "Identifier claimed concurrently, relocating site"
                    );
                    match self.relocate(&path).await {
                        Ok((next_id, next_path)) => {
                            identifier = next_id;
                            path = next_path;
                        }
                        Err(e) => {
                            self.discard(&path).await;
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    self.discard(&path).await;
                    return Err(SiteError::RecordPersistFailed(e));
                }
            }
        }
    }

    /// Rename a site: check, move the directory, then update the record.
    ///
    /// A failed move leaves the record untouched. A failed record update
    /// moves the directory back.
    #[instrument(skip(self))]
    pub async fn rename(
        &self,
        actor: &Actor,
        identifier: &str,
        new_identifier: &str,
    ) -> Result<SiteRow, SiteError> {
        let target = SiteIdentifier::parse(new_identifier)
            .map_err(|e| SiteError::InvalidIdentifier(e.to_string()))?;
        let site = self.find_managed(actor, identifier).await?;

        if site.identifier == target.as_str() {
            return Ok(site);
        }
        if self.metadata.identifier_exists(target.as_str()).await? {
            return Err(SiteError::IdentifierTaken(target.to_string()));
        }

        let from = site.storage_path();
        let to = self.storage.site_path(&target)?;
        let to_str = path_str(&to)?.to_string();

        match self.storage.move_site(&from, &to).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                return Err(SiteError::IdentifierTaken(target.to_string()));
            }
            Err(e) => return Err(SiteError::Storage(e)),
        }

        let now = OffsetDateTime::now_utc();
        if let Err(e) = self
            .metadata
            .update_site_identity(site.site_id, target.as_str(), &to_str, now)
            .await
        {
            if let Err(undo) = self.storage.move_site(&to, &from).await {
                error!(
                    site_id = site.site_id,
                    from = %to.display(),
                    to = %from.display(),
                    error = %undo,
                    "Failed to move site directory back after record update failed"
                );
            }
            return Err(match e {
                MetadataError::AlreadyExists(_) => SiteError::IdentifierTaken(target.to_string()),
                other => SiteError::RecordPersistFailed(other),
            });
        }

        metrics::SITES_RENAMED.inc();
        info!(
            site_id = site.site_id,
            from = %site.identifier,
            to = %target,
            "Site renamed"
        );
        self.request_reload("rename");

        Ok(SiteRow {
            identifier: target.to_string(),
            storage_path: to_str,
            updated_at: now,
            ..site
        })
    }

    /// Delete a site the actor manages. Returns the removed record.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: &Actor, identifier: &str) -> Result<SiteRow, SiteError> {
        let site = self.find_managed(actor, identifier).await?;
        self.delete_record(&site).await?;
        self.request_reload("delete");
        Ok(site)
    }

    /// Delete every site owned by `user_id`, one at a time.
    ///
    /// Stops at the first failure; the error reports how many sites were
    /// already gone.
    #[instrument(skip(self))]
    pub async fn delete_user_sites(&self, user_id: i64) -> Result<usize, SiteError> {
        let sites = self.metadata.list_sites_by_owner(user_id).await?;
        let mut removed = 0;

        for site in &sites {
            if let Err(e) = self.delete_record(site).await {
                if removed > 0 {
                    self.request_reload("delete");
                }
                return Err(SiteError::CascadeAborted {
                    removed,
                    source: Box::new(e),
                });
            }
            removed += 1;
        }

        if removed > 0 {
            self.request_reload("delete");
        }
        Ok(removed)
    }

    /// Remove the record, then the directory. If the directory cannot be
    /// removed the record is re-inserted unchanged.
    pub async fn delete_record(&self, site: &SiteRow) -> Result<(), SiteError> {
        match self.metadata.delete_site(site.site_id).await {
            Ok(()) => {}
            Err(MetadataError::NotFound(_)) => {
                return Err(SiteError::NotFound(site.identifier.clone()));
            }
            Err(e) => return Err(SiteError::Metadata(e)),
        }

        if let Err(err) = self.storage.remove_site(&site.storage_path()).await {
            warn!(
                site_id = site.site_id,
                identifier = %site.identifier,
                error = %err,
                "Directory removal failed, restoring site record"
            );
            match self.metadata.restore_site(site).await {
                Ok(()) => metrics::SITE_RESURRECTIONS.inc(),
                Err(restore_err) => {
                    metrics::SITE_RESURRECTION_FAILURES.inc();
                    error!(
                        site_id = site.site_id,
                        identifier = %site.identifier,
                        path = %site.storage_path,
                        error = %restore_err,
                        "Failed to restore site record; directory is now orphaned"
                    );
                }
            }
            return Err(SiteError::DirectoryRemovalFailed {
                identifier: site.identifier.clone(),
                reason: err.to_string(),
            });
        }

        metrics::SITES_DELETED.inc();
        info!(site_id = site.site_id, identifier = %site.identifier, "Site deleted");
        Ok(())
    }

    async fn find_managed(&self, actor: &Actor, identifier: &str) -> Result<SiteRow, SiteError> {
        let site = self
            .metadata
            .get_site_by_identifier(identifier)
            .await?
            .ok_or_else(|| SiteError::NotFound(identifier.to_string()))?;
        if !actor.may_manage(site.owner_id) {
            return Err(SiteError::Forbidden(format!(
                "site '{identifier}' belongs to another user"
            )));
        }
        Ok(site)
    }

    async fn materialize_fresh(
        &self,
        archive_path: &Path,
        archive: &ValidatedArchive,
    ) -> Result<(SiteIdentifier, PathBuf), SiteError> {
        loop {
            let identifier = self.allocator.allocate().await?;
            match self
                .storage
                .materialize(archive_path, archive, &identifier)
                .await
            {
                Ok(path) => return Ok((identifier, path)),
                Err(StorageError::AlreadyExists(existing)) => {
                    metrics::IDENTIFIER_COLLISIONS
                        .with_label_values(&["directory"])
                        .inc();
                    warn!(
                        identifier = %identifier,
                        path = %existing,
                        "Site directory exists without a record, drawing again"
                    );
                }
                Err(e) => return Err(SiteError::ExtractionFailed(e.to_string())),
            }
        }
    }

    /// Move an already materialized directory to a freshly allocated identifier.
    async fn relocate(&self, from: &Path) -> Result<(SiteIdentifier, PathBuf), SiteError> {
        loop {
            let identifier = self.allocator.allocate().await?;
            let to = self.storage.site_path(&identifier)?;
            match self.storage.move_site(from, &to).await {
                Ok(()) => {
                    debug!(identifier = %identifier, "Site directory relocated");
                    return Ok((identifier, to));
                }
                Err(StorageError::AlreadyExists(_)) => {
                    metrics::IDENTIFIER_COLLISIONS
                        .with_label_values(&["directory"])
                        .inc();
                }
                Err(e) => return Err(SiteError::Storage(e)),
            }
        }
    }

    /// Remove a directory whose record could not be written.
    async fn discard(&self, path: &Path) {
        if let Err(e) = self.storage.remove_site(path).await {
            error!(
                path = %path.display(),
                error = %e,
                "Failed to remove directory after record creation failed; directory is orphaned"
            );
        }
    }
}

fn path_str(path: &Path) -> Result<&str, SiteError> {
    path.to_str().ok_or_else(|| {
        SiteError::Internal(format!("site path is not valid UTF-8: {}", path.display()))
    })
}
