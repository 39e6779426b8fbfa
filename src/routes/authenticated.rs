use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes outside both role areas. The access policy lets any signed-in user through
/// and redirects anonymous visitors to the login page.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /me
        // The caller's resolved session (user id and role).
        .route("/me", get(handlers::get_me))
        // POST /logout
        // Clears the session cookies.
        .route("/logout", post(handlers::logout))
}
