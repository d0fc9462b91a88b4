use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch},
};

/// Admin Router Module
///
/// User management. Each handler calls `AuthUser::require(&[Role::Admin])` before doing
/// anything, and the services refuse an admin acting on their own account.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /user
        .route("/user", get(handlers::list_users))
        // DELETE /user/{id}
        // Cascades to the user's posts, comments, likes and reset tickets.
        .route("/user/{id}", delete(handlers::delete_user))
        // PATCH /user/{id}/role
        .route("/user/{id}/role", patch(handlers::update_role))
}
