//! Blog engagement ledger: views, likes and comments.
//!
//! Every mutation here is a single store operation (`increment_views`, `toggle_like`,
//! `insert_comment`), never a read-modify-write pair in this process.

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Comment, Role},
    repository::{LikeToggle, RepositoryState},
};

pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Clone)]
pub struct EngagementLedger {
    repo: RepositoryState,
}

impl EngagementLedger {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Returns the view count after the increment.
    pub async fn increment_view(&self, post_id: Uuid) -> Result<i64, AppError> {
        self.repo
            .increment_views(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("blog", post_id))
    }

    /// Likes the post for `caller_id` if they have not, unlikes it if they have.
    pub async fn toggle_like(&self, post_id: Uuid, caller_id: Uuid) -> Result<LikeToggle, AppError> {
        let toggle = self
            .repo
            .toggle_like(post_id, caller_id)
            .await?
            .ok_or_else(|| AppError::not_found("blog", post_id))?;
        tracing::debug!(post_id = %post_id, user_id = %caller_id, liked = toggle.liked, "like toggled");
        Ok(toggle)
    }

    pub async fn add_comment(
        &self,
        post_id: Uuid,
        caller_id: Uuid,
        content: &str,
    ) -> Result<Comment, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("content", "must not be empty"));
        }
        if content.chars().count() > MAX_COMMENT_LEN {
            return Err(AppError::validation(
                "content",
                format!("must be at most {MAX_COMMENT_LEN} characters"),
            ));
        }

        self.repo
            .insert_comment(post_id, caller_id, content)
            .await?
            .ok_or_else(|| AppError::not_found("blog", post_id))
    }

    pub async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>, AppError> {
        Ok(self.repo.comments_for_post(post_id).await?)
    }

    /// delete_comment
    ///
    /// Allowed for the comment's author or any admin; everyone else gets
    /// [`AppError::Authorization`]. When `post_id` is given the comment must belong to that
    /// post. A comment's author never changes, so checking before deleting is race-free.
    pub async fn delete_comment(
        &self,
        post_id: Option<Uuid>,
        comment_id: i64,
        caller_id: Uuid,
        caller_role: Role,
    ) -> Result<(), AppError> {
        let comment = self
            .repo
            .find_comment(comment_id)
            .await?
            .filter(|c| post_id.is_none_or(|p| c.post_id == p))
            .ok_or_else(|| AppError::not_found("comment", comment_id))?;

        if comment.user_id != caller_id && caller_role != Role::Admin {
            return Err(AppError::forbidden(
                "only the comment's author or an admin may delete it",
            ));
        }

        if !self.repo.delete_comment(comment_id).await? {
            return Err(AppError::not_found("comment", comment_id));
        }
        if comment.user_id != caller_id {
            tracing::info!(comment_id, admin_id = %caller_id, "comment removed by moderator");
        }
        Ok(())
    }
}
