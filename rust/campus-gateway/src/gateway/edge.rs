//! Page gate evaluated before any page is served.
//!
//! Only the presence of the session cookie is checked here. Whether the
//! token is still accepted is decided by the upstream on the next API call.
//! With `edge.verify_expiry` set, tokens whose JWT `exp` has passed are also
//! treated as absent; signatures are never verified at this layer.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use url::form_urlencoded;

use super::session::SessionCookies;
use crate::config::{EdgeConfig, UploadsConfig};
use crate::AppState;

/// Pages below this prefix are only useful to visitors without a session.
const AUTH_PAGE_PREFIX: &str = "/auth/";

const SERVICE_PATHS: [&str; 2] = ["/health", "/ready"];

const IMAGE_EXTENSIONS: [&str; 7] = [".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".ico"];

/// Outcome of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    Allow,
    Redirect(String),
}

/// Static route classification.
#[derive(Debug, Clone)]
pub struct RouteTable {
    public_routes: Vec<String>,
    login_path: String,
    dashboard_path: String,
    upload_prefix: String,
}

impl RouteTable {
    #[must_use]
    pub fn new(edge: &EdgeConfig, uploads: &UploadsConfig) -> Self {
        Self {
            public_routes: edge.public_routes.clone(),
            login_path: edge.login_path.clone(),
            dashboard_path: edge.dashboard_path.clone(),
            upload_prefix: uploads.public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// API routes, service probes, framework assets, uploads and images
    /// skip the gate.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        if path == "/api" || path.starts_with("/api/") {
            return true;
        }
        if SERVICE_PATHS.contains(&path) {
            return true;
        }
        if path.starts_with("/_next/static") || path.starts_with("/_next/image") || path == "/favicon.ico" {
            return true;
        }
        if path == self.upload_prefix || path.starts_with(&format!("{}/", self.upload_prefix)) {
            return true;
        }

        let lower = path.to_ascii_lowercase();
        IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }

    /// Prefix match; the root entry only matches `/` itself.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_routes.iter().any(|route| {
            if route == "/" {
                path == "/"
            } else {
                path.starts_with(route.as_str())
            }
        })
    }

    #[must_use]
    pub fn decide(&self, path: &str, has_session: bool) -> EdgeDecision {
        match (self.is_public(path), has_session) {
            (true, true) if path.starts_with(AUTH_PAGE_PREFIX) => {
                EdgeDecision::Redirect(self.dashboard_path.clone())
            }
            (true, _) | (false, true) => EdgeDecision::Allow,
            (false, false) => EdgeDecision::Redirect(self.login_redirect(path)),
        }
    }

    /// Login URL carrying the requested path as `redirect`.
    #[must_use]
    pub fn login_redirect(&self, path: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect", path)
            .finish();
        format!("{}?{}", self.login_path, query)
    }
}

/// `false` for anything that is not a JWT, or whose `exp` is not after
/// `now`. A JWT without `exp` never expires.
#[must_use]
pub fn token_unexpired(token: &str, now: i64) -> bool {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return false;
    };

    let Ok(decoded) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<Value>(&decoded) else {
        return false;
    };

    match claims.get("exp") {
        None => claims.is_object(),
        Some(exp) => exp
            .as_i64()
            .or_else(|| exp.as_f64().map(|f| f as i64))
            .is_some_and(|exp| exp > now),
    }
}

/// Middleware applying [`RouteTable::decide`] to every request.
pub async fn edge_filter(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if state.routes.is_excluded(&path) {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let has_session = SessionCookies::token(&jar).is_some_and(|token| {
        !state.config.edge.verify_expiry || token_unexpired(&token, chrono::Utc::now().timestamp())
    });

    match state.routes.decide(&path, has_session) {
        EdgeDecision::Allow => next.run(request).await,
        EdgeDecision::Redirect(target) => {
            tracing::debug!(path = %path, target = %target, has_session, "Edge redirect");
            Redirect::temporary(&target).into_response()
        }
    }
}
