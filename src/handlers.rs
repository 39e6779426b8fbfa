use crate::{
    AppState,
    auth::{
        ACCESS_TOKEN_COOKIE, ProviderSession, REFRESH_TOKEN_COOKIE, clear_cookie, decode_token,
        provider_session_cookies,
    },
    models::{
        CallbackParams, LoginRequest, PageView, Profile, RegisterRequest, Role, Session,
        SessionView,
    },
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use uuid::Uuid;

/// ProviderSignup
///
/// The provider's sign-up response: a bare user object when email confirmation is
/// pending, or a session wrapping the user when accounts are auto-confirmed.
#[derive(Deserialize)]
struct ProviderSignup {
    id: Option<Uuid>,
    user: Option<ProviderUser>,
}

#[derive(Deserialize)]
struct ProviderUser {
    id: Uuid,
}

impl ProviderSignup {
    fn user_id(&self) -> Option<Uuid> {
        self.id.or_else(|| self.user.as_ref().map(|user| user.id))
    }
}

fn page(name: &str, session: &Session) -> Json<PageView> {
    Json(PageView {
        page: name.to_string(),
        role: session.role,
    })
}

/// Response that sends the browser to `location` and installs the given cookies.
fn redirect_with_cookies(location: &str, cookies: Vec<HeaderValue>) -> Response {
    let mut response = Redirect::to(location).into_response();
    for cookie in cookies {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

// --- Auth Pages ---

/// login_page
///
/// [Auth Page] Only anonymous visitors reach this; signed-in users are sent to their landing page.
#[utoipa::path(get, path = "/login", responses((status = 200, body = PageView)))]
pub async fn login_page(session: Session) -> Json<PageView> {
    page("login", &session)
}

#[utoipa::path(get, path = "/register", responses((status = 200, body = PageView)))]
pub async fn register_page(session: Session) -> Json<PageView> {
    page("register", &session)
}

#[utoipa::path(get, path = "/forgot-password", responses((status = 200, body = PageView)))]
pub async fn forgot_password_page(session: Session) -> Json<PageView> {
    page("forgot-password", &session)
}

#[utoipa::path(get, path = "/reset-password", responses((status = 200, body = PageView)))]
pub async fn reset_password_page(session: Session) -> Json<PageView> {
    page("reset-password", &session)
}

/// login
///
/// [Auth Page] Exchanges email/password for a provider session using the password grant,
/// stores the tokens as HttpOnly cookies and redirects.
///
/// The redirect goes to the `redirectTo` path when it is a local path inside a role area,
/// otherwise to `/`, where the access policy dispatches to the role's landing page.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 303, description = "Signed in"),
        (status = 401, description = "Invalid credentials"),
        (status = 502, description = "Identity provider unreachable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, StatusCode> {
    let config = &state.config;
    let auth_url = format!("{}/auth/v1/token?grant_type=password", config.supabase_url);

    let response = state
        .http
        .post(auth_url)
        .header("apikey", &config.supabase_anon_key)
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Identity provider request failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !response.status().is_success() {
        tracing::info!(status = %response.status(), "Password grant rejected");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let provider_session = response.json::<ProviderSession>().await.map_err(|e| {
        tracing::error!("Malformed identity provider session: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let cookies = provider_session_cookies(&provider_session, config);

    let location = payload
        .redirect_to
        .as_deref()
        .and_then(|candidate| state.policy.safe_return_path(candidate))
        .unwrap_or("/");

    Ok(redirect_with_cookies(location, cookies))
}

/// register
///
/// [Auth Page] Creates the provider account, then mirrors it as a `CLIENT` profile.
/// Admin profiles are never created through this endpoint.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = Profile),
        (status = 400, description = "Rejected by the identity provider"),
        (status = 502, description = "Identity provider unreachable")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Profile>), StatusCode> {
    let config = &state.config;
    let auth_url = format!("{}/auth/v1/signup", config.supabase_url);

    let response = state
        .http
        .post(auth_url)
        .header("apikey", &config.supabase_anon_key)
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Identity provider request failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !response.status().is_success() {
        // Email taken, weak password, etc.
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = response
        .json::<ProviderSignup>()
        .await
        .ok()
        .and_then(|signup| signup.user_id())
        .ok_or(StatusCode::BAD_GATEWAY)?;

    let profile = Profile {
        id: user_id,
        email: payload.email,
        role: Role::Client.as_str().to_string(),
    };

    let created = state.repo.create_profile(profile).await.map_err(|e| {
        tracing::error!(%user_id, "Failed to create profile: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    tracing::info!(user_id = %created.id, "Registered new client profile");
    Ok((StatusCode::CREATED, Json(created)))
}

/// auth_callback
///
/// [Bypass] Landing point for the identity provider (email confirmation, password
/// recovery). A valid access token is stored as cookies; the browser is then sent to `/`
/// and the access policy takes over. An invalid or missing token goes to the login page.
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackParams),
    responses((status = 303, description = "Session stored or rejected"))
)]
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let config = &state.config;

    let Some(access_token) = params
        .access_token
        .filter(|token| decode_token(token, &config.jwt_secret).is_ok())
    else {
        tracing::info!("Auth callback without a valid access token");
        return Redirect::to(state.policy.login_path()).into_response();
    };

    let provider_session = ProviderSession {
        access_token,
        refresh_token: params.refresh_token,
        expires_in: None,
    };

    redirect_with_cookies("/", provider_session_cookies(&provider_session, config))
}

// --- Authenticated ---

/// get_me
///
/// [Authenticated Route] Reports the caller's resolved session.
#[utoipa::path(get, path = "/me", responses((status = 200, body = SessionView)))]
pub async fn get_me(session: Session) -> Json<SessionView> {
    Json(SessionView::from(&session))
}

/// logout
///
/// [Authenticated Route] Deletes both session cookies and returns to the login page.
#[utoipa::path(post, path = "/logout", responses((status = 303, description = "Signed out")))]
pub async fn logout(State(state): State<AppState>, session: Session) -> Response {
    if let Some(user_id) = session.user_id {
        tracing::info!(%user_id, "User signed out");
    }
    let secure = state.config.secure_cookies();
    let cookies = [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
        .into_iter()
        .filter_map(|name| clear_cookie(name, secure))
        .collect();
    redirect_with_cookies(state.policy.login_path(), cookies)
}

// --- Role Areas ---

/// admin_dashboard
///
/// [Admin Route] Admin landing page.
#[utoipa::path(get, path = "/admin/dashboard", responses((status = 200, body = PageView)))]
pub async fn admin_dashboard(session: Session) -> Json<PageView> {
    page("admin-dashboard", &session)
}

/// client_panel
///
/// [Client Route] Client landing page.
#[utoipa::path(get, path = "/client/panel", responses((status = 200, body = PageView)))]
pub async fn client_panel(session: Session) -> Json<PageView> {
    page("client-panel", &session)
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
