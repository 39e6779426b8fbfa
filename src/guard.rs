use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    auth::{ACCESS_TOKEN_COOKIE, ResolvedSession, resolve_session, sets_cookie},
};

/// access_control
///
/// Route-protection middleware applied to the whole router, ahead of every handler.
///
/// 1. Bypass paths (provider callback, health, docs, static files) go straight through;
///    no session is resolved for them.
/// 2. The session is resolved from cookies. This may rotate the access token or
///    exchange the refresh token.
/// 3. The access policy decides. `Allow` runs the inner service with the session in
///    request extensions; `Redirect` answers with `307 Temporary Redirect`.
/// 4. Cookies produced while resolving are appended to whichever response goes out,
///    so a rotated token survives a redirect too. A handler that sets the session
///    cookie itself (login, logout) owns the session and the resolver's cookies are
///    dropped.
pub async fn access_control(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state.policy.is_bypassed(&path) {
        return next.run(request).await;
    }

    let ResolvedSession { session, cookies } =
        resolve_session(request.headers(), &state.repo, &state.config, &state.http).await;

    let decision = state.policy.evaluate(&path, &session);

    tracing::debug!(
        path = %path,
        authenticated = session.authenticated,
        role = ?session.role,
        decision = ?decision,
        "Access decision"
    );

    let mut response = match decision.location(&state.policy) {
        None => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Some(location) => Redirect::temporary(&location).into_response(),
    };

    if !sets_cookie(response.headers(), ACCESS_TOKEN_COOKIE) {
        for cookie in cookies {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }

    response
}
