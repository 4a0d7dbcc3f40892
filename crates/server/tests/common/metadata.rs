//! PostgreSQL test store backed by a throwaway container.

use plinth_metadata::{MetadataError, MetadataResult, PostgresStore};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Marks container startup failures so callers can skip when Docker is absent.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

#[allow(dead_code)]
pub struct PostgresTestMetadata {
    pub store: PostgresStore,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} Failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let store = PostgresStore::from_url(&url, 5, None).await?;
        Ok(Self {
            store,
            _container: container,
        })
    }
}
