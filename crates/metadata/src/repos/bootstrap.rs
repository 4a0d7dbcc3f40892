//! Marker for the token created from the configured admin hash.

use crate::error::MetadataResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Tracks which token was provisioned from `admin.token_hash`, so a changed
/// hash can revoke its predecessor on the next start.
#[async_trait]
pub trait BootstrapRepo: Send + Sync {
    async fn bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>>;

    async fn record_bootstrap_token(&self, token_id: Uuid) -> MetadataResult<()>;
}
