//! Catch-all pass-through for upstream resources.
//!
//! Accounts, crimes, facilities, reports, announcements and statistics are
//! opaque to this service: `/api/<rest>` is forwarded to `<base>/<rest>`
//! with the caller's session attached, and whatever comes back is relayed.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::Response,
    routing::any,
    Router,
};
use axum_extra::extract::CookieJar;
use bytes::Bytes;

use super::proxy::ProxyRequest;
use super::session::SessionCookies;
use crate::AppState;

/// Pass-through routes. Registered after the specific `/api/*` handlers;
/// static segments win over the wildcard.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/{*path}", any(forward_to_upstream))
}

/// Upstream path for an incoming `/api/...` path.
fn upstream_path(path: &str) -> &str {
    path.strip_prefix("/api").unwrap_or(path)
}

async fn forward_to_upstream(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = SessionCookies::token(&jar);
    let mut request = ProxyRequest::new(method.clone(), upstream_path(uri.path())).with_auth();

    if method != Method::GET && method != Method::HEAD && !body.is_empty() {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        request = request.raw(body, Some(content_type));
    }

    state.gateway.relay(request, token.as_deref(), uri.query()).await
}
