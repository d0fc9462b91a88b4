use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Author Router Module
///
/// Post creation and the author dashboard. Handlers require the `author` role; the
/// dashboard only ever reads the caller's own posts.
pub fn author_routes() -> Router<AppState> {
    Router::new()
        // POST /blog
        .route("/blog", post(handlers::create_blog))
        // GET /author/dashboard/stats
        // Totals of views, likes and comments across the caller's posts.
        .route("/author/dashboard/stats", get(handlers::get_author_stats))
        // GET /author/dashboard/recent-blogs
        .route(
            "/author/dashboard/recent-blogs",
            get(handlers::get_recent_blogs),
        )
        // GET /author/blogs
        .route("/author/blogs", get(handlers::get_author_blogs))
        // GET /author/comments
        .route("/author/comments", get(handlers::get_author_comments))
        // DELETE /author/comments/{id}
        // Same rule as /blog/{slug}/comments/{id}.
        .route(
            "/author/comments/{id}",
            delete(handlers::delete_author_comment),
        )
}
