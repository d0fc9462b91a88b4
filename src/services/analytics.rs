//! Author analytics: read-only folds over the posts an author owns.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{AuthorComment, AuthorStats, BlogRef, BlogSummary, CommentAuthor, Post},
    repository::RepositoryState,
};

pub const RECENT_BLOGS: usize = 5;

/// Totals across `posts`. An author with no posts gets all zeros.
pub fn fold_stats(posts: &[Post]) -> AuthorStats {
    posts.iter().fold(AuthorStats::default(), |mut acc, p| {
        acc.total_blogs += 1;
        acc.total_views += p.views;
        acc.total_likes += p.likes.len() as i64;
        acc.total_comments += p.comments.len() as i64;
        acc
    })
}

#[derive(Clone)]
pub struct AnalyticsService {
    repo: RepositoryState,
}

impl AnalyticsService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// compute_stats
    ///
    /// Reads the author's posts in one store call, so the totals come from a single
    /// snapshot of each post.
    pub async fn compute_stats(&self, author_id: Uuid) -> Result<AuthorStats, AppError> {
        let posts = self.repo.posts_by_author(author_id).await?;
        Ok(fold_stats(&posts))
    }

    /// The author's `n` newest posts.
    pub async fn recent_blogs(&self, author_id: Uuid, n: usize) -> Result<Vec<BlogSummary>, AppError> {
        let posts = self.repo.posts_by_author(author_id).await?;
        Ok(posts.iter().take(n).map(BlogSummary::from).collect())
    }

    /// Every post the author owns, newest first.
    pub async fn author_blogs(&self, author_id: Uuid) -> Result<Vec<BlogSummary>, AppError> {
        let posts = self.repo.posts_by_author(author_id).await?;
        Ok(posts.iter().map(BlogSummary::from).collect())
    }

    /// author_comments
    ///
    /// Every comment on any of the author's posts, newest first, joined with its commenter
    /// and its post.
    pub async fn author_comments(&self, author_id: Uuid) -> Result<Vec<AuthorComment>, AppError> {
        let posts = self.repo.posts_by_author(author_id).await?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let comments = self.repo.comments_for_posts(&post_ids).await?;

        let mut commenter_ids: Vec<Uuid> = comments.iter().map(|c| c.user_id).collect();
        commenter_ids.sort_unstable();
        commenter_ids.dedup();
        let commenters: HashMap<Uuid, CommentAuthor> = self
            .repo
            .find_users_by_ids(&commenter_ids)
            .await?
            .into_iter()
            .map(|u| {
                (
                    u.id,
                    CommentAuthor {
                        id: u.id,
                        username: u.username,
                        email: u.email,
                        photo: u.photo,
                    },
                )
            })
            .collect();
        let blogs: HashMap<Uuid, &Post> = posts.iter().map(|p| (p.id, p)).collect();

        // A post deleted between the two reads drops its comments from the result.
        Ok(comments
            .into_iter()
            .filter_map(|c| {
                let post = blogs.get(&c.post_id)?;
                Some(AuthorComment {
                    id: c.id,
                    content: c.content,
                    created_at: c.created_at,
                    user: commenters.get(&c.user_id).cloned(),
                    blog: BlogRef {
                        id: post.id,
                        title: post.title.clone(),
                        slug: post.slug.clone(),
                    },
                })
            })
            .collect())
    }
}
