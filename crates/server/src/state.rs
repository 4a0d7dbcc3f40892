//! Application state shared across handlers.

use crate::metrics;
use crate::routing::RouteReloader;
use crate::sites::{IdentifierAllocator, Ingestor, SiteLifecycle};
use plinth_archive::ArchivePolicy;
use plinth_core::config::AppConfig;
use plinth_metadata::MetadataStore;
use plinth_storage::SiteStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Site directory storage.
    pub storage: Arc<dyn SiteStorage>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Record and directory lifecycle.
    pub sites: Arc<SiteLifecycle>,
    /// Upload pipeline.
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn SiteStorage>,
        metadata: Arc<dyn MetadataStore>,
        reloader: Arc<dyn RouteReloader>,
    ) -> Self {
        let allocator = IdentifierAllocator::new(metadata.clone());
        Self::with_allocator(config, storage, metadata, reloader, allocator)
    }

    /// Like [`AppState::new`] with a caller-supplied identifier allocator.
    pub fn with_allocator(
        config: AppConfig,
        storage: Arc<dyn SiteStorage>,
        metadata: Arc<dyn MetadataStore>,
        reloader: Arc<dyn RouteReloader>,
        allocator: IdentifierAllocator,
    ) -> Self {
        let policy = Arc::new(ArchivePolicy::new(
            config.server.max_upload_bytes,
            &config.archive,
        ));
        let sites = Arc::new(SiteLifecycle::new(
            metadata.clone(),
            storage.clone(),
            allocator,
            reloader,
        ));
        let ingestor = Arc::new(Ingestor::new(
            policy,
            sites.clone(),
            storage.scratch_dir().to_path_buf(),
            config.sites.base_domain.clone(),
        ));

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            sites,
            ingestor,
        }
    }

    /// Interval between scratch sweeps.
    /// Returns a default of 60 seconds if configured as zero
    /// (to prevent tokio::time::interval from panicking).
    pub fn scratch_sweep_interval(&self) -> Duration {
        let interval_secs = self.config.sites.scratch_sweep_interval_secs;
        if interval_secs == 0 {
            tracing::warn!("sites.scratch_sweep_interval_secs is 0, using default of 60 seconds");
            Duration::from_secs(60)
        } else {
            Duration::from_secs(interval_secs)
        }
    }

    /// Periodically delete upload buffers abandoned by crashed or killed requests.
    pub fn spawn_scratch_sweeper(&self) -> JoinHandle<()> {
        let storage = self.storage.clone();
        let period = self.scratch_sweep_interval();
        let max_age = Duration::from_secs(self.config.sites.scratch_max_age_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match storage.cleanup_scratch(max_age).await {
                    Ok(0) => {}
                    Ok(removed) => {
                        metrics::SCRATCH_FILES_SWEPT.inc_by(removed as u64);
                        tracing::info!(removed, "Swept stale upload buffers");
                    }
                    Err(e) => tracing::warn!(error = %e, "Scratch sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::NoopReloader;
    use plinth_metadata::SqliteStore;
    use plinth_storage::{FilesystemSites, OwnershipPolicy};
    use tempfile::tempdir;

    async fn build_state(config: AppConfig) -> (tempfile::TempDir, AppState) {
        let temp = tempdir().unwrap();
        let storage: Arc<dyn SiteStorage> = Arc::new(
            FilesystemSites::new(
                temp.path().join("sites"),
                temp.path().join("scratch"),
                OwnershipPolicy::modes_only(0o770, 0o660),
            )
            .await
            .unwrap(),
        );

        let db_path = temp.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(&db_path, None).await.unwrap());

        let state = AppState::new(config, storage, metadata, Arc::new(NoopReloader));
        (temp, state)
    }

    #[tokio::test]
    async fn scratch_sweep_interval_respects_config() {
        let mut config = AppConfig::for_testing();
        config.sites.scratch_sweep_interval_secs = 12;

        let (_temp, state) = build_state(config).await;
        assert_eq!(state.scratch_sweep_interval(), Duration::from_secs(12));
    }

    #[tokio::test]
    async fn scratch_sweep_interval_zero_uses_default() {
        let mut config = AppConfig::for_testing();
        config.sites.scratch_sweep_interval_secs = 0;

        let (_temp, state) = build_state(config).await;
        assert_eq!(state.scratch_sweep_interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn sweeper_removes_stale_buffers() {
        let mut config = AppConfig::for_testing();
        config.sites.scratch_sweep_interval_secs = 1;
        config.sites.scratch_max_age_secs = 0;

        let (_temp, state) = build_state(config).await;
        let stale = state.storage.scratch_dir().join("upload-stale.zip");
        std::fs::write(&stale, b"partial").unwrap();

        let handle = state.spawn_scratch_sweeper();
        // The first tick fires immediately.
        for _ in 0..50 {
            if !stale.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(!stale.exists());
    }
}
