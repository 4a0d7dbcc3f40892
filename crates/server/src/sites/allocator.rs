//! Random site identifier allocation.

use crate::metrics;
use plinth_core::SiteIdentifier;
use plinth_metadata::repos::SiteRepo;
use plinth_metadata::{MetadataResult, MetadataStore};
use std::sync::Arc;

type Generator = Arc<dyn Fn() -> SiteIdentifier + Send + Sync>;

/// Draws identifiers until one is not in the record store.
///
/// The lookup is advisory: two concurrent allocations can return the same
/// identifier. The store's UNIQUE constraint decides, and the loser redraws
/// (see `SiteLifecycle::create_with_retry`).
#[derive(Clone)]
pub struct IdentifierAllocator {
    metadata: Arc<dyn MetadataStore>,
    generate: Generator,
}

impl IdentifierAllocator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self::with_generator(metadata, SiteIdentifier::generate)
    }

    /// Use a custom candidate source, e.g. a scripted sequence in tests.
    pub fn with_generator(
        metadata: Arc<dyn MetadataStore>,
        generate: impl Fn() -> SiteIdentifier + Send + Sync + 'static,
    ) -> Self {
        Self {
            metadata,
            generate: Arc::new(generate),
        }
    }

    pub async fn allocate(&self) -> MetadataResult<SiteIdentifier> {
        loop {
            let candidate = (self.generate)();
            if !self.metadata.identifier_exists(candidate.as_str()).await? {
                return Ok(candidate);
            }
            metrics::IDENTIFIER_COLLISIONS
                .with_label_values(&["lookup"])
                .inc();
            tracing::debug!(identifier = %candidate, "identifier in use, drawing again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_metadata::SqliteStore;
    use plinth_metadata::models::NewSite;
    use std::sync::Mutex;

    fn scripted(names: &[&str]) -> impl Fn() -> SiteIdentifier + Send + Sync + 'static {
        let queue: Mutex<Vec<SiteIdentifier>> = Mutex::new(
            names
                .iter()
                .rev()
                .map(|n| SiteIdentifier::parse(n).unwrap())
                .collect(),
        );
        move || queue.lock().unwrap().pop().unwrap()
    }

    #[tokio::test]
    async fn skips_identifiers_already_recorded() {
        let store: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(":memory:", None).await.unwrap());
        store
            .create_site(&NewSite {
                owner_id: None,
                identifier: "taken".to_string(),
                storage_path: "/srv/sites/taken".to_string(),
                original_filename: "site.zip".to_string(),
            })
            .await
            .unwrap();

        let allocator =
            IdentifierAllocator::with_generator(store, scripted(&["taken", "taken", "fresh"]));
        assert_eq!(allocator.allocate().await.unwrap().as_str(), "fresh");
    }

    #[tokio::test]
    async fn default_generator_yields_five_lowercase_letters() {
        let store: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(":memory:", None).await.unwrap());
        let id = IdentifierAllocator::new(store).allocate().await.unwrap();
        assert_eq!(id.as_str().len(), plinth_core::GENERATED_IDENTIFIER_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_lowercase()));
    }
}
