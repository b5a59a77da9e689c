//! User repository trait for roster operations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::UserId;
use crate::models::{NewUser, ProfileUpdate, User, UserFilter};

/// Repository trait for roster entries.
///
/// Credentials never pass through here; authentication lives upstream.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a roster entry. Character names are unique; duplicates are a
    /// validation error.
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User>;

    /// Fetch a user, failing with `NotFound` when absent.
    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User>;

    /// Fetch a user, returning `None` when absent.
    async fn find_user(&self, user_id: UserId) -> RepositoryResult<Option<User>>;

    /// List users matching the filter, ordered by character name.
    async fn list_users(&self, filter: &UserFilter) -> RepositoryResult<Vec<User>>;

    /// Apply a partial profile update and return the updated user.
    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> RepositoryResult<User>;
}
