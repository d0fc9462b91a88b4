use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Roles ---

/// Role
///
/// The RBAC field carried by every credential and embedded in every session token.
/// Stored and serialized in lower case: `reader`, `author`, `admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Reader,
    Author,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Role::Reader),
            "author" => Ok(Role::Author),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

// --- Core Records (Mapped to Storage) ---

/// Credential
///
/// The durable user record as the store holds it, including the Argon2 PHC string.
/// Never serialized: everything that leaves the process goes through [`User`].
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User
///
/// Public projection of a [`Credential`]. This is what the API returns for profiles and
/// the admin user listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub photo: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<Credential> for User {
    fn from(c: Credential) -> Self {
        Self {
            id: c.id,
            username: c.username,
            email: c.email,
            role: c.role,
            photo: c.photo,
            created_at: c.created_at,
        }
    }
}

/// Insert payload for the credential store. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub photo: Option<String>,
}

/// Partial update of the mutable profile fields. `None` leaves the column untouched.
/// Role is deliberately absent; it only changes through the admin path.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}

/// ResetTicket
///
/// A single-use password reset secret. Only the SHA-256 of the secret is stored.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ResetTicket {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now < self.expires_at
    }
}

/// Post
///
/// A blog post with its engagement state. `likes` has set semantics (no duplicates) and
/// `comments` holds comment ids in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub image: Option<String>,
    pub views: i64,
    pub likes: Vec<Uuid>,
    pub comments: Vec<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
}

/// Comment
///
/// A comment on a post, augmented with the commenter's handle and photo (an explicit join
/// performed by the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub author_username: Option<String>,
    pub author_photo: Option<String>,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Defaults to `reader`. `admin` cannot be self-assigned.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Partial profile update (PATCH /user/profile/{id}).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateBlogRequest {
    pub title: String,
    pub body: String,
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateBlogRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub content: String,
}

// --- Responses (Output Schemas) ---

/// AuthResponse
///
/// Returned by register and login: the public profile flattened together with a fresh
/// session token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LikeResponse {
    /// Whether the caller likes the post after the toggle.
    pub liked: bool,
    pub likes: usize,
}

/// A page of the public blog listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BlogPage {
    pub blogs: Vec<Post>,
    pub total_blogs: i64,
    pub page: i64,
    pub total_pages: i64,
}

/// AuthorStats
///
/// Totals over every post owned by the calling author (GET /author/dashboard/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthorStats {
    pub total_blogs: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_comments: i64,
}

/// Selected fields of a post for dashboard tables; engagement collapsed to counts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct BlogSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub category: String,
    pub views: i64,
    pub likes: usize,
    pub comments: usize,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Post> for BlogSummary {
    fn from(p: &Post) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            slug: p.slug.clone(),
            category: p.category.clone(),
            views: p.views,
            likes: p.likes.len(),
            comments: p.comments.len(),
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct CommentAuthor {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct BlogRef {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

/// AuthorComment
///
/// A comment on one of the author's posts, joined with the commenter and the post
/// (GET /author/comments). `user` is `None` when the commenter no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct AuthorComment {
    pub id: i64,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub user: Option<CommentAuthor>,
    pub blog: BlogRef,
}
