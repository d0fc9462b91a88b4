use axum::{Router, extract::FromRef, http::HeaderName};
use chrono::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod password;
pub mod repository;
pub mod services;
pub mod session;

// Routing grouped by caller (public, authenticated, author, admin).
pub mod routes;
use routes::{admin, author, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use mailer::MailerState;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use session::SessionIssuer;

use password::PasswordHasher;
use services::{AnalyticsService, BlogService, CredentialService, EngagementLedger, PasswordResetFlow};

/// ApiDoc
///
/// OpenAPI document for every handler and payload, served at `/api-docs/openapi.json`
/// and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login_user, handlers::logout_user,
        handlers::forgot_password, handlers::reset_password, handlers::update_profile,
        handlers::list_users, handlers::delete_user, handlers::update_role,
        handlers::list_blogs, handlers::get_blog, handlers::create_blog,
        handlers::update_blog, handlers::delete_blog, handlers::toggle_like,
        handlers::get_comments, handlers::add_comment, handlers::delete_comment,
        handlers::get_author_stats, handlers::get_recent_blogs, handlers::get_author_blogs,
        handlers::get_author_comments, handlers::delete_author_comment
    ),
    components(
        schemas(
            models::Role, models::User, models::Post, models::Comment,
            models::RegisterRequest, models::LoginRequest, models::ForgotPasswordRequest,
            models::ResetPasswordRequest, models::UpdateProfileRequest, models::UpdateRoleRequest,
            models::CreateBlogRequest, models::UpdateBlogRequest, models::CreateCommentRequest,
            models::AuthResponse, models::MessageResponse, models::LikeResponse,
            models::BlogPage, models::AuthorStats, models::BlogSummary, models::AuthorComment,
            models::CommentAuthor, models::BlogRef, error::ErrorEnvelope, error::ErrorBody,
        )
    ),
    tags(
        (name = "inkwell", description = "Inkwell blogging platform API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a handler may need. Each component is
/// built once at startup from explicit dependencies and shared by reference count.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub mailer: MailerState,
    pub config: AppConfig,
    pub sessions: SessionIssuer,
    pub credentials: CredentialService,
    pub resets: PasswordResetFlow,
    pub blogs: BlogService,
    pub ledger: EngagementLedger,
    pub analytics: AnalyticsService,
}

impl AppState {
    /// Wires every component from the configuration and the two external collaborators.
    pub fn new(config: AppConfig, repo: RepositoryState, mailer: MailerState) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(&config.argon2)?;
        let sessions = SessionIssuer::new(&config.jwt_secret, Duration::hours(config.jwt_ttl_hours));
        let resets = PasswordResetFlow::new(
            repo.clone(),
            hasher.clone(),
            mailer.clone(),
            Duration::minutes(config.reset_ttl_minutes),
            &config.mail.reset_url_base,
        );

        Ok(Self {
            credentials: CredentialService::new(repo.clone(), hasher),
            resets,
            blogs: BlogService::new(repo.clone()),
            ledger: EngagementLedger::new(repo.clone()),
            analytics: AnalyticsService::new(repo.clone()),
            sessions,
            repo,
            mailer,
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

// Lets the `AuthUser` extractor verify tokens without seeing the rest of the state.
impl FromRef<AppState> for SessionIssuer {
    fn from_ref(app_state: &AppState) -> SessionIssuer {
        app_state.sessions.clone()
    }
}

/// create_router
///
/// Assembles the route groups, the docs and the observability layers around the shared
/// state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .merge(author::author_routes())
        .merge(admin::admin_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span. Every log line emitted while handling the request carries
/// its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = %loggable_path(request.uri().path()),
        req_id = %request_id,
    )
}

const RESET_PATH: &str = "/user/reset-password/";

/// The request path with any reset secret masked.
fn loggable_path(path: &str) -> String {
    match path.strip_prefix(RESET_PATH) {
        Some(_) => format!("{RESET_PATH}[redacted]"),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_secrets_are_masked_in_logs() {
        assert_eq!(
            loggable_path("/user/reset-password/abc123"),
            "/user/reset-password/[redacted]"
        );
        assert_eq!(loggable_path("/blog/hello"), "/blog/hello");
    }
}
