use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Nested under `/admin`. The access policy admits only `ADMIN` sessions; clients are
/// sent to their own panel and sessions without a recognized role to the login page.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/dashboard
        // Admin landing page.
        .route("/dashboard", get(handlers::admin_dashboard))
}
