use async_trait::async_trait;
use atelier_portal::{
    AppState,
    auth::{self, Claims},
    config::{AppConfig, Env},
    create_router,
    models::{Profile, Role},
    repository::Repository,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, Response, StatusCode, header},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tower::ServiceExt;
use uuid::Uuid;

// --- MOCK REPOSITORY IMPLEMENTATION ---

// Profiles keyed by user id; ids without an entry behave like a missing profile row.
#[derive(Default)]
struct MockProfiles {
    profiles: HashMap<Uuid, Profile>,
}

#[async_trait]
impl Repository for MockProfiles {
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
        Ok(self.profiles.get(&id).cloned())
    }

    async fn create_profile(&self, profile: Profile) -> Result<Profile, sqlx::Error> {
        Ok(profile)
    }
}

// --- TEST UTILITIES ---

const ADMIN_ID: Uuid = Uuid::from_u128(456);
const CLIENT_ID: Uuid = Uuid::from_u128(123);
const ROLELESS_ID: Uuid = Uuid::from_u128(789);

fn test_config() -> AppConfig {
    AppConfig {
        env: Env::Production,
        ..AppConfig::default()
    }
}

fn test_router() -> Router {
    let mut profiles = HashMap::new();
    for (id, role) in [(ADMIN_ID, "ADMIN"), (CLIENT_ID, "CLIENT")] {
        profiles.insert(
            id,
            Profile {
                id,
                email: format!("{}@atelier.test", role.to_lowercase()),
                role: role.to_string(),
            },
        );
    }
    create_router(AppState::new(
        Arc::new(MockProfiles { profiles }),
        test_config(),
    ))
}

fn token_for(user_id: Uuid, exp_offset: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };
    let key = EncodingKey::from_secret(test_config().jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(
            header::COOKIE,
            format!("{}={}", auth::ACCESS_TOKEN_COOKIE, token),
        );
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(method: Method, uri: &str, token: Option<&str>) -> Response<Body> {
    test_router()
        .oneshot(request(method, uri, token))
        .await
        .unwrap()
}

fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- GUARD REDIRECTS ---

#[tokio::test]
async fn test_anonymous_root_redirects_to_login() {
    let response = send(Method::GET, "/", None).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/login"));
}

#[tokio::test]
async fn test_anonymous_admin_redirect_keeps_destination() {
    let response = send(Method::GET, "/admin/dashboard", None).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        Some("/login?redirectTo=/admin/dashboard")
    );
}

#[tokio::test]
async fn test_client_cannot_enter_admin_area() {
    let token = token_for(CLIENT_ID, 3600);
    let response = send(Method::GET, "/admin/dashboard", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/client/panel"));
}

#[tokio::test]
async fn test_admin_cannot_enter_client_area() {
    let token = token_for(ADMIN_ID, 3600);
    let response = send(Method::GET, "/client/panel", Some(&token)).await;

    assert_eq!(location(&response), Some("/admin/dashboard"));
}

#[tokio::test]
async fn test_root_dispatches_by_role() {
    let admin = send(Method::GET, "/", Some(&token_for(ADMIN_ID, 3600))).await;
    let client = send(Method::GET, "/", Some(&token_for(CLIENT_ID, 3600))).await;

    assert_eq!(location(&admin), Some("/admin/dashboard"));
    assert_eq!(location(&client), Some("/client/panel"));
}

#[tokio::test]
async fn test_signed_in_user_is_kept_off_login() {
    let token = token_for(ADMIN_ID, 3600);
    let response = send(Method::GET, "/login", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/admin/dashboard"));
}

#[tokio::test]
async fn test_roleless_user_is_sent_to_login_and_can_see_it() {
    let token = token_for(ROLELESS_ID, 3600);

    let response = send(Method::GET, "/client/panel", Some(&token)).await;
    assert_eq!(location(&response), Some("/login"));

    let response = send(Method::GET, "/login", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// --- ALLOWED REQUESTS ---

#[tokio::test]
async fn test_client_reaches_panel() {
    let token = token_for(CLIENT_ID, 3600);
    let response = send(Method::GET, "/client/panel", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["page"], "client-panel");
    assert_eq!(body["role"], "CLIENT");
}

#[tokio::test]
async fn test_admin_reaches_dashboard() {
    let token = token_for(ADMIN_ID, 3600);
    let response = send(Method::GET, "/admin/dashboard", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["page"], "admin-dashboard");
}

#[tokio::test]
async fn test_allowed_unrouted_path_falls_through_to_not_found() {
    let token = token_for(CLIENT_ID, 3600);
    let response = send(Method::GET, "/client/panel/settings", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_anonymous_sees_login_page() {
    let response = send(Method::GET, "/login", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["page"], "login");
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn test_me_reports_session() {
    let token = token_for(ADMIN_ID, 3600);
    let response = send(Method::GET, "/me", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], ADMIN_ID.to_string());
    assert_eq!(body["role"], serde_json::to_value(Role::Admin).unwrap());
}

// --- BYPASS ---

#[tokio::test]
async fn test_health_and_static_files_bypass_guard() {
    let health = send(Method::GET, "/health", None).await;
    assert_eq!(health.status(), StatusCode::OK);

    let asset = send(Method::GET, "/favicon.ico", None).await;
    assert_eq!(asset.status(), StatusCode::NOT_FOUND);
    assert!(location(&asset).is_none());
}

#[tokio::test]
async fn test_callback_without_token_reaches_handler() {
    let response = send(Method::GET, "/auth/callback", None).await;

    // 303 comes from the handler; the guard would have answered 307.
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_callback_stores_valid_tokens() {
    let token = token_for(CLIENT_ID, 3600);
    let uri = format!("/auth/callback?access_token={}&refresh_token=r-1", token);
    let response = send(Method::GET, &uri, None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with(&format!("sb-access-token={};", token)));
    assert!(cookies[1].starts_with("sb-refresh-token=r-1;"));
}

#[tokio::test]
async fn test_callback_rejects_forged_token() {
    let response = send(
        Method::GET,
        "/auth/callback?access_token=forged.token.value",
        None,
    )
    .await;

    assert_eq!(location(&response), Some("/login"));
    assert!(set_cookies(&response).is_empty());
}

// --- COOKIE PROPAGATION ---

#[tokio::test]
async fn test_rotated_cookie_rides_on_allowed_response() {
    let token = token_for(CLIENT_ID, 30);
    let response = send(Method::GET, "/client/panel", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("sb-access-token="));
}

#[tokio::test]
async fn test_rotated_cookie_rides_on_redirect() {
    let token = token_for(CLIENT_ID, 30);
    let response = send(Method::GET, "/admin/dashboard", Some(&token)).await;

    assert_eq!(location(&response), Some("/client/panel"));
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("sb-access-token="));
}

// --- LOGOUT ---

#[tokio::test]
async fn test_logout_clears_both_cookies() {
    let token = token_for(CLIENT_ID, 3600);
    let response = send(Method::POST, "/logout", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|cookie| cookie.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_logout_inside_refresh_window_is_not_undone_by_rotation() {
    // Near expiry: the guard would normally re-issue the access cookie.
    let token = token_for(CLIENT_ID, 60);
    let response = send(Method::POST, "/logout", Some(&token)).await;

    assert_eq!(location(&response), Some("/login"));

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    let access: Vec<_> = cookies
        .iter()
        .filter(|cookie| cookie.starts_with("sb-access-token="))
        .collect();
    assert_eq!(access.len(), 1);
    assert!(access[0].starts_with("sb-access-token=;"));
    assert!(access[0].contains("Max-Age=0"));
}

#[tokio::test]
async fn test_anonymous_logout_is_redirected_by_guard() {
    let response = send(Method::POST, "/logout", None).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/login"));
}
