use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no session. Reads here only ever expose public projections
/// (`User`, `Post`, `Comment`), never credential material.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /user/register
        // Creates a reader or author account and returns a session token.
        .route("/user/register", post(handlers::register_user))
        // POST /user/login
        .route("/user/login", post(handlers::login_user))
        // POST /user/forgot-password
        // Always 200, registered email or not.
        .route("/user/forgot-password", post(handlers::forgot_password))
        // POST /user/reset-password/{token}
        .route(
            "/user/reset-password/{token}",
            post(handlers::reset_password),
        )
        // GET /blog?page=&limit=&category=
        .route("/blog", get(handlers::list_blogs))
        // GET /blog/{slug}
        // Counts a view on every read.
        .route("/blog/{slug}", get(handlers::get_blog))
        // GET /blog/{slug}/comments
        .route("/blog/{slug}/comments", get(handlers::get_comments))
}
