//! PostgreSQL integration tests using testcontainers.
//!
//! These tests require Docker. Set SKIP_POSTGRES_TESTS=1 to skip them.

mod common;

use common::{POSTGRES_CONTAINER_START_ERR_PREFIX, PostgresTestMetadata};
use plinth_metadata::MetadataError;
use plinth_metadata::models::{NewSite, TokenRow};
use plinth_metadata::repos::{SiteRepo, TokenRepo, UserRepo};
use time::OffsetDateTime;
use uuid::Uuid;

/// Start a PostgreSQL store, or return `None` when Docker is unavailable or
/// SKIP_POSTGRES_TESTS is set. Any other setup failure panics.
async fn postgres_or_skip() -> Option<PostgresTestMetadata> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestMetadata::new().await {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

fn new_site(owner_id: Option<i64>, identifier: &str, storage_path: &str) -> NewSite {
    NewSite {
        owner_id,
        identifier: identifier.to_string(),
        storage_path: storage_path.to_string(),
        original_filename: "site.zip".to_string(),
    }
}

#[tokio::test]
async fn test_postgres_duplicate_identifier_is_already_exists() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = &metadata.store;

    store
        .create_site(&new_site(None, "taken", "/srv/sites/taken"))
        .await
        .expect("first create failed");
    let err = store
        .create_site(&new_site(None, "taken", "/srv/sites/other"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
    assert_eq!(store.list_sites().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_postgres_duplicate_storage_path_is_already_exists() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = &metadata.store;

    store
        .create_site(&new_site(None, "left", "/srv/sites/shared"))
        .await
        .expect("first create failed");
    let err = store
        .create_site(&new_site(None, "right", "/srv/sites/shared"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
    assert!(!store.identifier_exists("right").await.unwrap());
}

#[tokio::test]
async fn test_postgres_restore_site_keeps_id() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = &metadata.store;

    let created = store
        .create_site(&new_site(None, "phoenix", "/srv/sites/phoenix"))
        .await
        .unwrap();
    // Read back so timestamps carry the column's precision.
    let site = store.get_site(created.site_id).await.unwrap().unwrap();

    store.delete_site(site.site_id).await.unwrap();
    assert!(store.get_site(site.site_id).await.unwrap().is_none());
    store.restore_site(&site).await.unwrap();

    let restored = store.get_site(site.site_id).await.unwrap().unwrap();
    assert_eq!(restored, site);

    // Later inserts still draw fresh ids.
    let next = store
        .create_site(&new_site(None, "fledgling", "/srv/sites/fledgling"))
        .await
        .unwrap();
    assert_ne!(next.site_id, site.site_id);
}

#[tokio::test]
async fn test_postgres_rename_onto_taken_identifier() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = &metadata.store;

    let first = store
        .create_site(&new_site(None, "first", "/srv/sites/first"))
        .await
        .unwrap();
    let first = store.get_site(first.site_id).await.unwrap().unwrap();
    store
        .create_site(&new_site(None, "second", "/srv/sites/second"))
        .await
        .unwrap();

    let err = store
        .update_site_identity(
            first.site_id,
            "second",
            "/srv/sites/elsewhere",
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
    assert_eq!(store.get_site(first.site_id).await.unwrap(), Some(first.clone()));

    store
        .update_site_identity(
            first.site_id,
            "third",
            "/srv/sites/third",
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();
    let renamed = store.get_site_by_identifier("third").await.unwrap().unwrap();
    assert_eq!(renamed.site_id, first.site_id);
    assert_eq!(renamed.storage_path, "/srv/sites/third");
}

#[tokio::test]
async fn test_postgres_delete_user_is_atomic() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = &metadata.store;

    let user = store.create_user("holder").await.unwrap();
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: Some(user.user_id),
        token_hash: "a".repeat(64),
        scopes: r#"["sites:write"]"#.to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: None,
    };
    store.create_token(&token).await.unwrap();
    let site = store
        .create_site(&new_site(Some(user.user_id), "owned", "/srv/sites/owned"))
        .await
        .unwrap();

    assert!(matches!(
        store.delete_user(user.user_id).await,
        Err(MetadataError::Constraint(_))
    ));
    assert!(store.get_user(user.user_id).await.unwrap().is_some());
    assert!(store.get_token(token.token_id).await.unwrap().is_some());

    store.delete_site(site.site_id).await.unwrap();
    assert_eq!(store.delete_user(user.user_id).await.unwrap(), 1);
    assert!(store.get_token(token.token_id).await.unwrap().is_none());
    assert!(matches!(
        store.delete_user(user.user_id).await,
        Err(MetadataError::NotFound(_))
    ));
}
