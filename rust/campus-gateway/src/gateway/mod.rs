//! Gateway functionality - session cookies, upstream forwarding, uploads and
//! page gating.
//!
//! - [`session`]: the `auth_token` cookie and the session extractor
//! - [`proxy`]: the single-call forwarding client
//! - [`auth`]: login, logout and account endpoints
//! - [`uploads`]: local and forwarded file uploads
//! - [`routes`]: catch-all pass-through for every other `/api/*` path
//! - [`edge`]: the page gate middleware

pub mod auth;
pub mod edge;
pub mod proxy;
pub mod routes;
pub mod session;
pub mod uploads;

use axum::Router;

use crate::AppState;

pub use proxy::{Gateway, GatewayError, ProxyBody, ProxyRequest, UpstreamBody, UpstreamResponse};
pub use session::{SessionCookies, SessionToken, SESSION_COOKIE};

/// Create the gateway router with all gateway-specific routes.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(uploads::router())
        .merge(routes::router())
}
