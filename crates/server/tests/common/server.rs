//! Server test utilities.

use super::fixtures::sha256_hash;
use super::mocks::{FaultyMetadata, FaultyStorage, RecordingReloader};
use plinth_core::config::{AppConfig, MetadataConfig};
use plinth_metadata::models::TokenRow;
use plinth_metadata::repos::{TokenRepo, UserRepo};
use plinth_metadata::{MetadataStore, SqliteStore};
use plinth_server::bootstrap::ensure_admin_token;
use plinth_server::{AppState, IdentifierAllocator, create_router};
use plinth_storage::{FilesystemSites, OwnershipPolicy, SiteStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage: Arc<FaultyStorage>,
    pub faults: Arc<FaultyMetadata>,
    pub reloader: Arc<RecordingReloader>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, None).await
    }

    /// Create a test server whose identifier allocator draws from `generate`.
    pub async fn with_generator(
        generate: impl Fn() -> plinth_core::SiteIdentifier + Send + Sync + 'static,
    ) -> Self {
        Self::build(|_| {}, Some(Box::new(generate))).await
    }

    async fn build<F>(
        modifier: F,
        generate: Option<Box<dyn Fn() -> plinth_core::SiteIdentifier + Send + Sync>>,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        config.sites.root = temp_dir.path().join("sites");
        config.sites.scratch_dir = temp_dir.path().join("scratch");
        config.sites.owner_group = None;
        let db_path = temp_dir.path().join("metadata.db");
        config.metadata = MetadataConfig::Sqlite {
            path: db_path.clone(),
            busy_timeout_secs: None,
        };
        modifier(&mut config);

        // Ownership changes need privileges the test process lacks.
        let filesystem: Arc<dyn SiteStorage> = Arc::new(
            FilesystemSites::new(
                &config.sites.root,
                &config.sites.scratch_dir,
                OwnershipPolicy::modes_only(config.sites.dir_mode, config.sites.file_mode),
            )
            .await
            .expect("Failed to create site storage"),
        );
        let storage = Arc::new(FaultyStorage::new(filesystem));

        let sqlite: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );
        let faults = Arc::new(FaultyMetadata::new(sqlite));
        let metadata: Arc<dyn MetadataStore> = faults.clone();
        ensure_admin_token(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to bootstrap admin token");

        let reloader = Arc::new(RecordingReloader::default());
        let allocator = match generate {
            Some(generate) => IdentifierAllocator::with_generator(metadata.clone(), generate),
            None => IdentifierAllocator::new(metadata.clone()),
        };

        let state = AppState::with_allocator(
            config,
            storage.clone(),
            metadata,
            reloader.clone(),
            allocator,
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage,
            faults,
            reloader,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Directory every site lives under.
    pub fn sites_root(&self) -> PathBuf {
        self.state.storage.root().to_path_buf()
    }

    /// Names of the directories currently under the sites root.
    pub fn site_dirs(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.sites_root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Create a user and return its id.
    pub async fn create_user(&self, username: &str) -> i64 {
        self.metadata()
            .create_user(username)
            .await
            .expect("Failed to create user")
            .user_id
    }

    /// Create a token for `user_id` and return the raw secret.
    pub async fn create_token(&self, user_id: Option<i64>, scopes: &[&str]) -> String {
        let raw_token = format!("test-token-{}", Uuid::new_v4());

        let token = TokenRow {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash: sha256_hash(raw_token.as_bytes()),
            scopes: serde_json::to_string(scopes).unwrap(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            description: Some("Test Token".to_string()),
        };

        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");

        raw_token
    }

    /// Create a user with a `sites:write` token.
    pub async fn user_with_token(&self, username: &str) -> (i64, String) {
        let user_id = self.create_user(username).await;
        let token = self.create_token(Some(user_id), &["sites:write"]).await;
        (user_id, token)
    }
}
