use crate::{
    error::StoreError,
    models::{
        Comment, Credential, NewCredential, NewPost, Post, PostChanges, ProfileChanges,
        ResetTicket, Role,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Outcome of an atomic like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeToggle {
    /// Whether the caller is in the like set after the toggle.
    pub liked: bool,
    /// Size of the like set after the toggle.
    pub likes: usize,
}

/// UserStore
///
/// Credential persistence. Uniqueness of `username` and `email` is enforced by the store
/// and reported as [`StoreError::UniqueViolation`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, new: NewCredential) -> Result<Credential, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<Credential>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError>;
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Credential>, StoreError>;
    async fn list_users(&self) -> Result<Vec<Credential>, StoreError>;
    /// Applies only the `Some` fields. Returns `None` if the user does not exist.
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<Credential>, StoreError>;
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Credential>, StoreError>;
    /// Removes the user together with their posts, comments, likes and reset tickets.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// ResetTicketStore
///
/// Both methods are single atomic units: callers never observe a half-applied state.
#[async_trait]
pub trait ResetTicketStore: Send + Sync {
    /// Discards every unconsumed ticket of `ticket.user_id` and stores `ticket`.
    async fn replace_reset_ticket(&self, ticket: ResetTicket) -> Result<(), StoreError>;

    /// Finds the unconsumed ticket with `token_hash` that is still valid at `now`, marks it
    /// consumed and sets the owner's password hash, all or nothing. Returns the owner id,
    /// or `None` when no usable ticket matched.
    async fn consume_reset_ticket(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError>;
}

/// PostStore
///
/// Post persistence plus the two engagement counters that must be updated in place.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, new: NewPost) -> Result<Post, StoreError>;
    async fn find_post_by_id(&self, id: Uuid) -> Result<Option<Post>, StoreError>;
    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>, StoreError>;
    /// Newest first. Returns the page and the total number of matching posts.
    async fn list_posts(
        &self,
        category: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Post>, i64), StoreError>;
    /// Every post owned by `author_id`, newest first.
    async fn posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>, StoreError>;
    async fn update_post(&self, id: Uuid, changes: PostChanges)
    -> Result<Option<Post>, StoreError>;
    /// Removes the post with its comments and likes.
    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError>;
    /// `views += 1` as one store operation. Returns the new count, `None` if the post is gone.
    async fn increment_views(&self, id: Uuid) -> Result<Option<i64>, StoreError>;
    /// Adds `user_id` to the like set if absent, removes it otherwise, as one store
    /// operation. `None` if the post is gone.
    async fn toggle_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<LikeToggle>, StoreError>;
}

/// CommentStore
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Appends a comment. `None` if the post does not exist (checked in the same operation).
    async fn insert_comment(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Option<Comment>, StoreError>;
    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, StoreError>;
    /// Creation order.
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>, StoreError>;
    /// Newest first.
    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> Result<Vec<Comment>, StoreError>;
    async fn delete_comment(&self, id: i64) -> Result<bool, StoreError>;
}

/// Repository
///
/// The full persistence contract, implemented by [`PostgresRepository`] in production and
/// [`MemoryRepository`] locally and in tests.
pub trait Repository: UserStore + ResetTicketStore + PostStore + CommentStore {}

impl<T> Repository for T where T: UserStore + ResetTicketStore + PostStore + CommentStore {}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
