use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use std::sync::Arc;
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
pub mod guard;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

// Routes grouped by the area the access policy assigns them to.
pub mod routes;
use routes::{admin, authenticated, client, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use policy::{AccessPolicy, Decision, RedirectTarget, RouteClass};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the portal's endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login_page, handlers::register_page, handlers::forgot_password_page,
        handlers::reset_password_page, handlers::login, handlers::register,
        handlers::auth_callback, handlers::get_me, handlers::logout,
        handlers::admin_dashboard, handlers::client_panel
    ),
    components(
        schemas(
            models::Role, models::Session, models::Profile, models::LoginRequest,
            models::RegisterRequest, models::SessionView, models::PageView,
        )
    ),
    tags(
        (name = "atelier-portal", description = "Embroidery shop portal: sessions and access control")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container for everything a request needs. Cloned per request;
/// every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Profile lookups for role resolution and registration.
    pub repo: RepositoryState,
    /// The loaded environment configuration.
    pub config: AppConfig,
    /// Route tables and landing pages for the access-control layer.
    pub policy: Arc<AccessPolicy>,
    /// Pooled HTTP client for identity-provider calls.
    pub http: reqwest::Client,
}

impl AppState {
    /// Builds state with the default route layout and a fresh HTTP client.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            config,
            policy: Arc::new(AccessPolicy::default()),
            http: reqwest::Client::new(),
        }
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

impl FromRef<AppState> for reqwest::Client {
    fn from_ref(app_state: &AppState) -> reqwest::Client {
        app_state.http.clone()
    }
}

/// create_router
///
/// Assembles every route, wraps them all in the access-control layer, and adds the
/// observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .nest("/admin", admin::admin_routes())
        .nest("/client", client::client_routes())
        // Unrouted paths (including `/`) still pass through the guard, so anonymous
        // visitors are redirected before they ever see a 404.
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::access_control,
        ))
        .with_state(state);

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
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: tags every log line of a request with its
/// `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
