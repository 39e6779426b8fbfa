use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints an anonymous visitor may reach. The auth pages are classified as such by
/// the access policy, which also sends signed-in users away from them. `/health` and
/// `/auth/callback` are bypass paths and never see the policy at all.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET/POST /login
        // Sign-in form and the password-grant exchange with the identity provider.
        .route("/login", get(handlers::login_page).post(handlers::login))
        // GET/POST /register
        // Self-service sign-up. Always creates a CLIENT profile.
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/forgot-password", get(handlers::forgot_password_page))
        .route("/reset-password", get(handlers::reset_password_page))
        // GET /auth/callback
        // Identity-provider redirect target; stores the issued tokens as cookies.
        .route("/auth/callback", get(handlers::auth_callback))
}
