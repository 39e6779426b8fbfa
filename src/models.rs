use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity & Session Schemas ---

/// Role
///
/// The RBAC tag stored in the `profiles.role` column. The database holds free-form text,
/// so anything other than `ADMIN`/`CLIENT` is mapped to `Unknown` instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    Admin,
    Client,
    #[serde(other)]
    Unknown,
}

impl Role {
    /// parse
    ///
    /// Maps a raw role column value to a `Role`. Matching is case-insensitive and
    /// ignores surrounding whitespace.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else if raw.eq_ignore_ascii_case("client") {
            Role::Client
        } else {
            Role::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Client => "CLIENT",
            Role::Unknown => "UNKNOWN",
        }
    }
}

/// Session
///
/// The resolved identity for one request. Produced by the session resolver and passed
/// explicitly into the access policy; never stored.
///
/// `role` may be `None` while `authenticated` is true: the token was valid but the
/// profile row was missing or could not be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Session {
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub role: Option<Role>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: Uuid, role: Option<Role>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id),
            role,
        }
    }

    /// effective_role
    ///
    /// Collapses a missing profile and an unrecognized role value into `None`, so the
    /// policy only ever branches on `Admin`, `Client`, or "no recognized role".
    pub fn effective_role(&self) -> Option<Role> {
        match self.role {
            Some(Role::Unknown) | None => None,
            known => known,
        }
    }
}

/// Profile
///
/// Row of the `public.profiles` table, mirrored from the identity provider's user list.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    // Primary Key, also the Foreign Key to the provider's auth.users table.
    pub id: Uuid,
    pub email: String,
    // Raw RBAC column: 'ADMIN' or 'CLIENT'.
    pub role: String,
}

impl Profile {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }
}

// --- Request Payloads ---

/// LoginRequest
///
/// Form payload for `POST /login`. The password is forwarded to the identity provider
/// and never logged or stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Protected path the user was bounced from, echoed back from `/login?redirectTo=`.
    #[serde(rename = "redirectTo", default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

/// RegisterRequest
///
/// Payload for `POST /register`. Self-registration always produces a `CLIENT` profile;
/// administrators are provisioned out of band.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// CallbackParams
///
/// Query parameters delivered by the identity provider when it redirects back into the app.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

// --- Response Schemas ---

/// SessionView
///
/// Output of `GET /me`: what the server currently believes about the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionView {
    pub user_id: Option<Uuid>,
    pub role: Option<Role>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            role: session.role,
        }
    }
}

/// PageView
///
/// Placeholder document returned by the page endpoints. Rendering is done by the
/// frontend; the server only reports which page was reached and for whom.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageView {
    pub page: String,
    pub role: Option<Role>,
}
