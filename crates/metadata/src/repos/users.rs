//! User repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user; usernames are unique.
    async fn create_user(&self, username: &str) -> MetadataResult<UserRow>;

    async fn get_user(&self, user_id: i64) -> MetadataResult<Option<UserRow>>;

    async fn list_users(&self) -> MetadataResult<Vec<UserRow>>;

    /// Delete the user together with its tokens, returning how many tokens
    /// went with it. Fails with `Constraint` while sites still reference the
    /// user, in which case the tokens are kept.
    async fn delete_user(&self, user_id: i64) -> MetadataResult<u64>;
}
