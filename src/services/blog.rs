//! Post lifecycle: create, read, list, update and delete, with unique slugs.

use crate::{
    auth::AuthUser,
    error::{AppError, StoreError},
    models::{BlogPage, CreateBlogRequest, NewPost, Post, PostChanges, UpdateBlogRequest},
    repository::RepositoryState,
};

/// How many `-n` suffixes are tried before a slug collision becomes a conflict.
pub const MAX_SLUG_ATTEMPTS: u32 = 20;
const MAX_SLUG_LEN: usize = 80;
const MAX_TITLE_LEN: usize = 200;
pub const DEFAULT_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 50;
/// Highest page number accepted; keeps `(page - 1) * limit` inside `i64`.
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// slugify
///
/// Lower-case ASCII alphanumerics joined by single hyphens, at most 80 characters.
/// Titles with no usable characters become `post`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug.to_string()
    }
}

fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt == 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}

fn is_slug_collision(err: &StoreError) -> bool {
    matches!(err, StoreError::UniqueViolation(c) if c.contains("slug"))
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    Ok(value.to_string())
}

fn valid_title(raw: &str) -> Result<String, AppError> {
    let title = required("title", raw)?;
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(title)
}

#[derive(Clone)]
pub struct BlogService {
    repo: RepositoryState,
}

impl BlogService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Post, AppError> {
        self.repo
            .find_post_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::not_found("blog", slug))
    }

    /// Newest first. `page` is clamped to `1..=MAX_PAGE`, `limit` to `1..=MAX_PAGE_SIZE`.
    pub async fn list(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        category: Option<&str>,
    ) -> Result<BlogPage, AppError> {
        let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let category = category.map(str::trim).filter(|c| !c.is_empty());

        let (blogs, total_blogs) = self
            .repo
            .list_posts(category, (page - 1) * limit, limit)
            .await?;

        Ok(BlogPage {
            blogs,
            total_blogs,
            page,
            total_pages: (total_blogs + limit - 1) / limit,
        })
    }

    /// create
    ///
    /// Tries `slug`, `slug-2`, `slug-3`, ... until the store accepts one.
    pub async fn create(&self, author: &AuthUser, req: CreateBlogRequest) -> Result<Post, AppError> {
        let title = valid_title(&req.title)?;
        let body = required("body", &req.body)?;
        let category = required("category", &req.category)?;
        let base = slugify(&title);

        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            let new = NewPost {
                author_id: author.id,
                slug: slug_candidate(&base, attempt),
                title: title.clone(),
                body: body.clone(),
                category: category.clone(),
                image: req.image.clone(),
            };
            match self.repo.insert_post(new).await {
                Ok(post) => {
                    tracing::info!(post_id = %post.id, slug = %post.slug, "blog created");
                    return Ok(post);
                }
                Err(e) if is_slug_collision(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Conflict(format!(
            "could not find a free slug for '{base}'"
        )))
    }

    /// update
    ///
    /// Owner or admin. A new title re-derives the slug under the same uniqueness rule.
    pub async fn update(
        &self,
        caller: &AuthUser,
        slug: &str,
        req: UpdateBlogRequest,
    ) -> Result<Post, AppError> {
        let post = self.get_by_slug(slug).await?;
        caller.require_owner_or_admin(post.author_id)?;

        let title = req.title.as_deref().map(valid_title).transpose()?;
        let body = req.body.as_deref().map(|b| required("body", b)).transpose()?;
        let category = req
            .category
            .as_deref()
            .map(|c| required("category", c))
            .transpose()?;

        let base = title.as_deref().map(slugify);
        let attempts = if base.is_some() { MAX_SLUG_ATTEMPTS } else { 1 };

        for attempt in 1..=attempts {
            let changes = PostChanges {
                slug: base.as_deref().map(|b| slug_candidate(b, attempt)),
                title: title.clone(),
                body: body.clone(),
                category: category.clone(),
                image: req.image.clone(),
            };
            match self.repo.update_post(post.id, changes).await {
                Ok(Some(updated)) => return Ok(updated),
                Ok(None) => return Err(AppError::not_found("blog", slug)),
                Err(e) if is_slug_collision(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Conflict("could not find a free slug for the new title".to_string()))
    }

    /// Owner or admin. Comments and likes go with the post.
    pub async fn delete(&self, caller: &AuthUser, slug: &str) -> Result<(), AppError> {
        let post = self.get_by_slug(slug).await?;
        caller.require_owner_or_admin(post.author_id)?;
        if !self.repo.delete_post(post.id).await? {
            return Err(AppError::not_found("blog", slug));
        }
        tracing::info!(post_id = %post.id, by = %caller.id, "blog deleted");
        Ok(())
    }
}
