use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::models::{Role, Session};

/// Characters escaped when a path is embedded as the `redirectTo` query value.
/// `/` is left readable so the login page sees `/login?redirectTo=/admin/dashboard`.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Query parameter carrying the originally requested protected path.
pub const REDIRECT_TO_PARAM: &str = "redirectTo";

/// RouteClass
///
/// Access-control category of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    AuthPage,
    AdminArea,
    ClientArea,
    Root,
    Other,
}

/// RedirectTarget
///
/// The only destinations the policy can send a browser to. Keeping these as a closed enum
/// rather than a path string makes an open redirect unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Login,
    AdminHome,
    ClientHome,
}

impl RedirectTarget {
    /// Landing page for a role; no recognized role lands on the login page.
    pub fn landing(role: Option<Role>) -> Self {
        match role {
            Some(Role::Admin) => RedirectTarget::AdminHome,
            Some(Role::Client) => RedirectTarget::ClientHome,
            Some(Role::Unknown) | None => RedirectTarget::Login,
        }
    }
}

/// Decision
///
/// Outcome of evaluating one request against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect {
        target: RedirectTarget,
        /// Set only when an anonymous user is bounced away from a role area.
        redirect_to: Option<String>,
    },
}

impl Decision {
    fn redirect(target: RedirectTarget) -> Self {
        Decision::Redirect {
            target,
            redirect_to: None,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// location
    ///
    /// Renders the `Location` header value for a redirect, or `None` for `Allow`.
    pub fn location(&self, policy: &AccessPolicy) -> Option<String> {
        match self {
            Decision::Allow => None,
            Decision::Redirect {
                target,
                redirect_to: None,
            } => Some(policy.target_path(*target).to_string()),
            Decision::Redirect {
                target,
                redirect_to: Some(origin),
            } => Some(format!(
                "{}?{}={}",
                policy.target_path(*target),
                REDIRECT_TO_PARAM,
                utf8_percent_encode(origin, QUERY_VALUE)
            )),
        }
    }
}

/// AccessPolicy
///
/// Static route tables and landing pages, built once at startup and shared read-only
/// across requests. Evaluation is a pure function of `(path, session)`.
///
/// Route roots are tested in registration order, auth pages first, so overlapping
/// prefixes resolve deterministically.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    routes: Vec<(String, RouteClass)>,
    bypass_roots: Vec<String>,
    asset_prefix: String,
    login_path: String,
    admin_home: String,
    client_home: String,
}

impl Default for AccessPolicy {
    /// The shop's route layout: auth flows at the top level, `/admin` and `/client` areas,
    /// and the identity-provider callback plus operational endpoints left unguarded.
    fn default() -> Self {
        AccessPolicy::new("/login", "/admin/dashboard", "/client/panel")
            .auth_page("/login")
            .auth_page("/register")
            .auth_page("/forgot-password")
            .auth_page("/reset-password")
            .admin_area("/admin")
            .client_area("/client")
            .bypass("/auth/callback")
            .bypass("/health")
            .bypass("/api-docs")
            .bypass("/swagger-ui")
            .asset_prefix("/_app")
    }
}

impl AccessPolicy {
    /// new
    ///
    /// Creates a policy with the three landing paths and empty route tables.
    pub fn new(login_path: &str, admin_home: &str, client_home: &str) -> Self {
        Self {
            routes: Vec::new(),
            bypass_roots: Vec::new(),
            asset_prefix: String::new(),
            login_path: login_path.to_string(),
            admin_home: admin_home.to_string(),
            client_home: client_home.to_string(),
        }
    }

    pub fn auth_page(self, root: &str) -> Self {
        self.route(root, RouteClass::AuthPage)
    }

    pub fn admin_area(self, root: &str) -> Self {
        self.route(root, RouteClass::AdminArea)
    }

    pub fn client_area(self, root: &str) -> Self {
        self.route(root, RouteClass::ClientArea)
    }

    pub fn bypass(mut self, root: &str) -> Self {
        self.bypass_roots.push(normalize_root(root));
        self
    }

    pub fn asset_prefix(mut self, prefix: &str) -> Self {
        self.asset_prefix = prefix.to_string();
        self
    }

    fn route(mut self, root: &str, class: RouteClass) -> Self {
        let root = normalize_root(root);
        // Auth pages win over role areas regardless of registration order.
        let position = match class {
            RouteClass::AuthPage => self
                .routes
                .iter()
                .position(|(_, c)| *c != RouteClass::AuthPage)
                .unwrap_or(self.routes.len()),
            _ => self.routes.len(),
        };
        self.routes.insert(position, (root, class));
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn target_path(&self, target: RedirectTarget) -> &str {
        match target {
            RedirectTarget::Login => &self.login_path,
            RedirectTarget::AdminHome => &self.admin_home,
            RedirectTarget::ClientHome => &self.client_home,
        }
    }

    /// Landing path for a role (`Admin` → admin home, `Client` → client home, else login).
    pub fn landing_for(&self, role: Option<Role>) -> &str {
        self.target_path(RedirectTarget::landing(role))
    }

    /// is_bypassed
    ///
    /// True for paths that skip access control entirely: registered bypass roots, the
    /// framework asset prefix, and anything whose last segment looks like a file name.
    pub fn is_bypassed(&self, path: &str) -> bool {
        if self
            .bypass_roots
            .iter()
            .any(|root| matches_root(path, root))
        {
            return true;
        }
        if !self.asset_prefix.is_empty() && path.starts_with(&self.asset_prefix) {
            return true;
        }
        path.rsplit('/').next().is_some_and(|last| last.contains('.'))
    }

    /// classify
    ///
    /// Maps a path to its route class. First matching root wins; `/` is `Root` unless a
    /// table explicitly claims it; everything else is `Other`.
    pub fn classify(&self, path: &str) -> RouteClass {
        self.routes
            .iter()
            .find(|(root, _)| matches_root(path, root))
            .map(|(_, class)| *class)
            .unwrap_or(if path == "/" {
                RouteClass::Root
            } else {
                RouteClass::Other
            })
    }

    /// safe_return_path
    ///
    /// Accepts a post-login `redirectTo` value only if it is a local path inside one of
    /// the role areas. Anything else (absolute URLs, protocol-relative `//host`, auth
    /// pages, unknown paths) is dropped so login can never bounce to a foreign site.
    pub fn safe_return_path<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        if !candidate.starts_with('/')
            || candidate.starts_with("//")
            || candidate.contains('\\')
        {
            return None;
        }
        match self.classify(candidate) {
            RouteClass::AdminArea | RouteClass::ClientArea => Some(candidate),
            _ => None,
        }
    }

    /// evaluate
    ///
    /// Decides whether a request passes through or is redirected. Total: every
    /// `(path, session)` pair yields exactly one decision and nothing here can fail.
    ///
    /// Exception: an authenticated session with no recognized role is allowed onto auth
    /// pages, since its landing page is the login page itself.
    pub fn evaluate(&self, path: &str, session: &Session) -> Decision {
        if self.is_bypassed(path) {
            return Decision::Allow;
        }

        let class = self.classify(path);

        if !session.authenticated {
            return match class {
                RouteClass::AuthPage => Decision::Allow,
                RouteClass::AdminArea | RouteClass::ClientArea => Decision::Redirect {
                    target: RedirectTarget::Login,
                    redirect_to: Some(path.to_string()),
                },
                RouteClass::Root | RouteClass::Other => Decision::redirect(RedirectTarget::Login),
            };
        }

        let role = session.effective_role();

        match class {
            RouteClass::Root => Decision::redirect(RedirectTarget::landing(role)),
            RouteClass::AuthPage => match RedirectTarget::landing(role) {
                // Sending a signed-in user without a usable profile from /login back to
                // /login would loop; let them reach the auth page instead.
                RedirectTarget::Login => Decision::Allow,
                landing => Decision::redirect(landing),
            },
            RouteClass::AdminArea => match role {
                Some(Role::Admin) => Decision::Allow,
                Some(Role::Client) => Decision::redirect(RedirectTarget::ClientHome),
                _ => Decision::redirect(RedirectTarget::Login),
            },
            RouteClass::ClientArea => match role {
                Some(Role::Client) => Decision::Allow,
                Some(Role::Admin) => Decision::redirect(RedirectTarget::AdminHome),
                _ => Decision::redirect(RedirectTarget::Login),
            },
            RouteClass::Other => Decision::Allow,
        }
    }
}

fn normalize_root(root: &str) -> String {
    match root.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// A path belongs to `root` if it equals it or continues with `root + "/"`.
fn matches_root(path: &str, root: &str) -> bool {
    if root == "/" {
        return path == "/";
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
