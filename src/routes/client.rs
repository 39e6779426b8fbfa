use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Client Router Module
///
/// Nested under `/client`. Only `CLIENT` sessions get through; admins are redirected
/// to their dashboard.
pub fn client_routes() -> Router<AppState> {
    Router::new()
        // GET /client/panel
        // Client landing page.
        .route("/panel", get(handlers::client_panel))
}
