use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, ErrorEnvelope},
    models::{
        AuthResponse, AuthorComment, AuthorStats, BlogPage, BlogSummary, Comment,
        CreateBlogRequest, CreateCommentRequest, ForgotPasswordRequest, LikeResponse,
        LoginRequest, MessageResponse, Post, RegisterRequest, ResetPasswordRequest, Role,
        UpdateBlogRequest, UpdateProfileRequest, UpdateRoleRequest, User,
    },
    services::analytics::RECENT_BLOGS,
};
use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        path::ErrorKind,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
};
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

/// Returned by forgot-password whether or not the email is registered.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If that email is registered, a password reset link has been sent.";

// --- Extractors & Filters ---

/// JsonBody
///
/// `Json<T>` whose rejection (bad content type, malformed or mistyped body) is rendered
/// through the same error envelope as every other failure.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::validation("body", rejection.body_text())
}

/// PathParam
///
/// `Path<T>` with the envelope treatment. A segment that fails to parse is reported under
/// its own name when axum knows it, and never with the parser's wording.
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParam(value)),
            Err(rejection) => Err(path_rejection(rejection)),
        }
    }
}

fn path_rejection(rejection: PathRejection) -> AppError {
    tracing::debug!(%rejection, "path rejected");
    let field = match &rejection {
        PathRejection::FailedToDeserializePathParams(err) => match err.kind() {
            ErrorKind::ParseErrorAtKey { key, .. }
            | ErrorKind::DeserializeError { key, .. }
            | ErrorKind::InvalidUtf8InPathParam { key } => key.clone(),
            _ => "path".to_string(),
        },
        _ => "path".to_string(),
    };
    AppError::validation(field, "malformed path parameter")
}

/// QueryParams
///
/// `Query<T>` with the envelope treatment.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> AppError {
    tracing::debug!(%rejection, "query string rejected");
    AppError::validation("query", "malformed query string")
}

/// BlogQuery
///
/// Query parameters of the public listing (GET /blog).
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct BlogQuery {
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Page size, clamped to 1..=50. Defaults to 5.
    pub limit: Option<i64>,
    /// Exact category match.
    pub category: Option<String>,
}

// --- Users ---

/// register_user
///
/// [Public Route] Creates a credential and signs the new user straight in.
#[utoipa::path(
    post,
    path = "/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorEnvelope),
        (status = 409, description = "Email or username taken", body = ErrorEnvelope)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let credential = state
        .credentials
        .register(
            &payload.username,
            &payload.email,
            &payload.password,
            payload.role.unwrap_or_default(),
            payload.photo,
        )
        .await?;
    let token = state.sessions.issue(&credential)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: credential.into(),
            token,
        }),
    ))
}

/// login_user
///
/// [Public Route] Exchanges email and password for a session token. Unknown email and
/// wrong password are the same 401.
#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorEnvelope)
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let credential = state
        .credentials
        .verify_password(&payload.email, &payload.password)
        .await?;
    let token = state.sessions.issue(&credential)?;
    tracing::info!(user_id = %credential.id, "user signed in");

    Ok(Json(AuthResponse {
        user: credential.into(),
        token,
    }))
}

/// logout_user
///
/// [Authenticated Route] Sessions are stateless, so this only acknowledges; the client drops
/// its token.
#[utoipa::path(
    get,
    path = "/user/logout",
    responses(
        (status = 200, description = "Signed out", body = MessageResponse),
        (status = 401, description = "No valid session", body = ErrorEnvelope)
    )
)]
pub async fn logout_user(user: AuthUser) -> Json<MessageResponse> {
    tracing::debug!(user_id = %user.id, "user signed out");
    Json(MessageResponse::new("Signed out"))
}

/// forgot_password
///
/// [Public Route] Starts the reset flow. The response never depends on whether the email
/// is registered.
#[utoipa::path(
    post,
    path = "/user/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Accepted", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.resets.request_reset(&payload.email).await?;
    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

/// reset_password
///
/// [Public Route] Consumes a reset secret and sets the new password.
#[utoipa::path(
    post,
    path = "/user/reset-password/{token}",
    params(("token" = String, Path, description = "Reset secret from the mail")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Weak password", body = ErrorEnvelope),
        (status = 401, description = "Unknown, expired or used secret", body = ErrorEnvelope)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.resets.consume_reset(&token, &payload.password).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// update_profile
///
/// [Authenticated Route] Self only: an admin edits roles through `/user/{id}/role`, not
/// other people's profiles.
#[utoipa::path(
    patch,
    path = "/user/profile/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 403, description = "Not your profile", body = ErrorEnvelope),
        (status = 409, description = "Email or username taken", body = ErrorEnvelope)
    )
)]
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    if user.id != id {
        return Err(AppError::forbidden("you can only update your own profile"));
    }
    let updated = state
        .credentials
        .update_profile(
            id,
            payload.username.as_deref(),
            payload.email.as_deref(),
            payload.photo,
        )
        .await?;
    Ok(Json(updated.into()))
}

/// list_users
///
/// [Admin Route] Every registered user, newest first.
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Users", body = [User]),
        (status = 403, description = "Not an admin", body = ErrorEnvelope)
    )
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    user.require(&[Role::Admin])?;
    Ok(Json(state.credentials.list().await?))
}

/// delete_user
///
/// [Admin Route] Removes a user with everything they own.
#[utoipa::path(
    delete,
    path = "/user/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin", body = ErrorEnvelope),
        (status = 404, description = "Not Found", body = ErrorEnvelope),
        (status = 409, description = "Cannot delete yourself", body = ErrorEnvelope)
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(&[Role::Admin])?;
    state.credentials.delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// update_role
///
/// [Admin Route] The only way a role changes. Takes effect at the user's next sign-in.
#[utoipa::path(
    patch,
    path = "/user/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 403, description = "Not an admin", body = ErrorEnvelope),
        (status = 409, description = "Cannot demote yourself", body = ErrorEnvelope)
    )
)]
pub async fn update_role(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    user.require(&[Role::Admin])?;
    let updated = state.credentials.set_role(user.id, id, payload.role).await?;
    Ok(Json(updated.into()))
}

// --- Blogs ---

/// list_blogs
///
/// [Public Route] Paginated listing, newest first.
#[utoipa::path(
    get,
    path = "/blog",
    params(BlogQuery),
    responses((status = 200, description = "A page of blogs", body = BlogPage))
)]
pub async fn list_blogs(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<BlogQuery>,
) -> Result<Json<BlogPage>, AppError> {
    let page = state
        .blogs
        .list(query.page, query.limit, query.category.as_deref())
        .await?;
    Ok(Json(page))
}

/// get_blog
///
/// [Public Route] Returns a post and counts the read.
#[utoipa::path(
    get,
    path = "/blog/{slug}",
    params(("slug" = String, Path, description = "Blog slug")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn get_blog(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<Json<Post>, AppError> {
    let mut post = state.blogs.get_by_slug(&slug).await?;
    post.views = state.ledger.increment_view(post.id).await?;
    Ok(Json(post))
}

/// create_blog
///
/// [Author Route] Publishes a post owned by the caller.
#[utoipa::path(
    post,
    path = "/blog",
    request_body = CreateBlogRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 400, description = "Invalid input", body = ErrorEnvelope),
        (status = 403, description = "Not an author", body = ErrorEnvelope)
    )
)]
pub async fn create_blog(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateBlogRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    user.require(&[Role::Author])?;
    let post = state.blogs.create(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_blog
///
/// [Authenticated Route] Owner, or an admin moderating.
#[utoipa::path(
    patch,
    path = "/blog/{slug}",
    params(("slug" = String, Path, description = "Blog slug")),
    request_body = UpdateBlogRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not Owner", body = ErrorEnvelope),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn update_blog(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    JsonBody(payload): JsonBody<UpdateBlogRequest>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.blogs.update(&user, &slug, payload).await?))
}

/// delete_blog
///
/// [Authenticated Route] Owner or admin. Comments and likes go with it.
#[utoipa::path(
    delete,
    path = "/blog/{slug}",
    params(("slug" = String, Path, description = "Blog slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner", body = ErrorEnvelope),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn delete_blog(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<StatusCode, AppError> {
    state.blogs.delete(&user, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Engagement ---

/// toggle_like
///
/// [Authenticated Route] Likes the post, or takes the like back if the caller already
/// liked it.
#[utoipa::path(
    post,
    path = "/blog/{slug}/like",
    params(("slug" = String, Path, description = "Blog slug")),
    responses(
        (status = 200, description = "Toggled", body = LikeResponse),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn toggle_like(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<Json<LikeResponse>, AppError> {
    let post = state.blogs.get_by_slug(&slug).await?;
    let toggle = state.ledger.toggle_like(post.id, user.id).await?;
    Ok(Json(LikeResponse {
        liked: toggle.liked,
        likes: toggle.likes,
    }))
}

/// get_comments
///
/// [Public Route] Comments on a post in the order they were written.
#[utoipa::path(
    get,
    path = "/blog/{slug}/comments",
    params(("slug" = String, Path, description = "Blog slug")),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn get_comments(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let post = state.blogs.get_by_slug(&slug).await?;
    Ok(Json(state.ledger.comments(post.id).await?))
}

/// add_comment
///
/// [Authenticated Route]
#[utoipa::path(
    post,
    path = "/blog/{slug}/comments",
    params(("slug" = String, Path, description = "Blog slug")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment Added", body = Comment),
        (status = 400, description = "Empty comment", body = ErrorEnvelope),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    JsonBody(payload): JsonBody<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let post = state.blogs.get_by_slug(&slug).await?;
    let comment = state
        .ledger
        .add_comment(post.id, user.id, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// delete_comment
///
/// [Authenticated Route] The comment's author or an admin.
#[utoipa::path(
    delete,
    path = "/blog/{slug}/comments/{id}",
    params(
        ("slug" = String, Path, description = "Blog slug"),
        ("id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author or an admin", body = ErrorEnvelope),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam((slug, id)): PathParam<(String, i64)>,
) -> Result<StatusCode, AppError> {
    let post = state.blogs.get_by_slug(&slug).await?;
    state
        .ledger
        .delete_comment(Some(post.id), id, user.id, user.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Author Dashboard ---

/// get_author_stats
///
/// [Author Route] Totals over every post the caller owns.
#[utoipa::path(
    get,
    path = "/author/dashboard/stats",
    responses(
        (status = 200, description = "Stats", body = AuthorStats),
        (status = 403, description = "Not an author", body = ErrorEnvelope)
    )
)]
pub async fn get_author_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AuthorStats>, AppError> {
    user.require(&[Role::Author])?;
    Ok(Json(state.analytics.compute_stats(user.id).await?))
}

/// get_recent_blogs
///
/// [Author Route]
#[utoipa::path(
    get,
    path = "/author/dashboard/recent-blogs",
    responses((status = 200, description = "Five newest posts", body = [BlogSummary]))
)]
pub async fn get_recent_blogs(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BlogSummary>>, AppError> {
    user.require(&[Role::Author])?;
    Ok(Json(state.analytics.recent_blogs(user.id, RECENT_BLOGS).await?))
}

/// get_author_blogs
///
/// [Author Route]
#[utoipa::path(
    get,
    path = "/author/blogs",
    responses((status = 200, description = "My Blogs", body = [BlogSummary]))
)]
pub async fn get_author_blogs(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BlogSummary>>, AppError> {
    user.require(&[Role::Author])?;
    Ok(Json(state.analytics.author_blogs(user.id).await?))
}

/// get_author_comments
///
/// [Author Route] Comments on any of the caller's posts, newest first.
#[utoipa::path(
    get,
    path = "/author/comments",
    responses((status = 200, description = "Comments", body = [AuthorComment]))
)]
pub async fn get_author_comments(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AuthorComment>>, AppError> {
    user.require(&[Role::Author])?;
    Ok(Json(state.analytics.author_comments(user.id).await?))
}

/// delete_author_comment
///
/// [Author Route] Same rule as every comment deletion: the comment's author or an admin.
#[utoipa::path(
    delete,
    path = "/author/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author or an admin", body = ErrorEnvelope),
        (status = 404, description = "Not Found", body = ErrorEnvelope)
    )
)]
pub async fn delete_author_comment(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, AppError> {
    state
        .ledger
        .delete_comment(None, id, user.id, user.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
