use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Authenticated Router Module
///
/// Routes open to any valid session. Ownership (profile, post, comment) is checked inside
/// the handler or service against the id proven by the token, never against the request body.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /user/logout
        .route("/user/logout", get(handlers::logout_user))
        // PATCH /user/profile/{id}
        // Self only.
        .route("/user/profile/{id}", patch(handlers::update_profile))
        // PATCH/DELETE /blog/{slug}
        // Owner or admin.
        .route(
            "/blog/{slug}",
            patch(handlers::update_blog).delete(handlers::delete_blog),
        )
        // POST /blog/{slug}/like
        // Toggle: a second call takes the like back.
        .route("/blog/{slug}/like", post(handlers::toggle_like))
        // POST /blog/{slug}/comments
        .route("/blog/{slug}/comments", post(handlers::add_comment))
        // DELETE /blog/{slug}/comments/{id}
        // Comment author or admin.
        .route(
            "/blog/{slug}/comments/{id}",
            delete(handlers::delete_comment),
        )
}
