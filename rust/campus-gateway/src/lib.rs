//! Campus Gateway - session-holding front door for the incident-reporting
//! backend.
//!
//! Browsers never see the backend bearer token. The gateway keeps it in an
//! HttpOnly cookie, attaches it to every forwarded API call, and gates page
//! navigation on whether a session exists at all:
//!
//! - **Sessions**: issue and clear the `auth_token` cookie
//! - **Proxy**: one upstream call per request, status and body relayed as-is
//! - **Auth flows**: login, logout, registration and password management
//! - **Uploads**: evidence and announcement files on local disk, profile
//!   pictures forwarded upstream
//! - **Edge filter**: redirects anonymous visitors away from protected pages
//!
//! # Architecture
//!
//! - [`config`]: Configuration loading and validation
//! - [`gateway`]: Sessions, forwarding, auth, uploads and the page gate
//! - [`api`]: Local service endpoints
//! - [`server`]: Router assembly and middleware
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_gateway::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod server;

use std::sync::Arc;

use config::AppConfig;
use gateway::edge::RouteTable;
use gateway::{Gateway, GatewayError, SessionCookies};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Upstream client. Cheap to clone.
    pub gateway: Gateway,
    pub sessions: SessionCookies,
    /// Page classification used by the edge filter.
    pub routes: Arc<RouteTable>,
}

impl AppState {
    /// Build the state. Fails when no upstream base URL is configured.
    pub fn new(config: AppConfig) -> Result<Self, GatewayError> {
        let gateway = Gateway::new(&config.upstream)?;
        let sessions = SessionCookies::new(config.secure_cookies());
        let routes = Arc::new(RouteTable::new(&config.edge, &config.uploads));

        Ok(Self {
            config: Arc::new(config),
            gateway,
            sessions,
            routes,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.config.environment)
            .field("upstream", &self.gateway.base_url())
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}
