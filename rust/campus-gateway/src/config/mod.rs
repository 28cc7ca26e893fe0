//! Configuration management for the campus gateway.
//!
//! Configuration is layered: built-in defaults, then optional config files
//! (`config/campus-gateway.{yaml,toml,json}`), then `CAMPUS__*` environment
//! variables, then the handful of well-known variables the front end has
//! always used (`BACKEND_API_URL`, `NEXT_PUBLIC_API_URL`, `APP_ENV`,
//! `NODE_ENV`).
//!
//! # Validation
//!
//! ```rust,ignore
//! use campus_gateway::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load_unchecked()?;
//! ConfigValidator::validate(&config)?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Runtime environment; production enables `Secure` cookies.
    #[serde(default)]
    pub environment: Environment,
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream backend API configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Session cookie configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Local upload storage configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
    /// Page gating configuration.
    #[serde(default)]
    pub edge: EdgeConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from all sources and validate it.
    ///
    /// Use [`Self::load_unchecked`] to skip validation.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;

        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{}", e))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .add_source(config::File::with_name("config/campus-gateway").required(false))
            .add_source(
                config::Environment::with_prefix("CAMPUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize()?;

        // The server-side variable wins over the one shared with the browser bundle.
        if let Some(url) = env_non_empty("BACKEND_API_URL").or_else(|| env_non_empty("NEXT_PUBLIC_API_URL")) {
            app_config.upstream.base_url = Some(url);
        }

        if let Some(env) = env_non_empty("APP_ENV").or_else(|| env_non_empty("NODE_ENV")) {
            match env.parse() {
                Ok(environment) => app_config.environment = environment,
                Err(e) => tracing::warn!("Ignoring environment override: {}", e),
            }
        }

        Ok(app_config)
    }

    /// Whether session cookies carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.session
            .secure
            .unwrap_or_else(|| self.environment.is_production())
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "test" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!("Unknown environment: {s}")),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds, applied to the whole request.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_timeout() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upstream backend API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every proxied path is appended to. No default: a wrong
    /// fallback in production would silently route traffic elsewhere.
    pub base_url: Option<String>,
    /// TCP connect timeout. Whole-request time is bounded by the server
    /// timeout instead.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// `User-Agent` sent upstream.
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_secs: default_connect_timeout(),
            user_agent: None,
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Force the `Secure` attribute on or off. Derived from the environment
    /// when unset.
    pub secure: Option<bool>,
}

/// Local upload storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Directory uploaded files are written under.
    #[serde(default = "default_upload_root")]
    pub root_dir: PathBuf,
    /// URL path prefix uploaded files are served from.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Absolute origin used to build the `url` field of upload responses.
    pub public_base_url: Option<String>,
}

fn default_upload_root() -> PathBuf {
    PathBuf::from("./public/uploads")
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root_dir: default_upload_root(),
            public_prefix: default_public_prefix(),
            public_base_url: None,
        }
    }
}

/// Page gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Login page unauthenticated visitors are sent to.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Landing page for authenticated visitors of auth pages.
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,
    /// Public path prefixes. `/` only ever matches the root itself.
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,
    /// Treat session tokens whose JWT `exp` claim has passed as absent.
    /// Signatures are never checked at this layer.
    #[serde(default)]
    pub verify_expiry: bool,
    /// Static front-end build served to page requests that pass the gate.
    pub pages_dir: Option<PathBuf>,
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_dashboard_path() -> String {
    "/dashboard".to_string()
}

fn default_public_routes() -> Vec<String> {
    [
        "/",
        "/auth/login",
        "/auth/register",
        "/auth/forgot-password",
        "/auth/reset-password",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            dashboard_path: default_dashboard_path(),
            public_routes: default_public_routes(),
            verify_expiry: false,
            pages_dir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to use JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("development".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_secure_cookies_follow_environment() {
        let mut config = AppConfig::default();
        assert!(!config.secure_cookies());

        config.environment = Environment::Production;
        assert!(config.secure_cookies());

        config.session.secure = Some(false);
        assert!(!config.secure_cookies());
    }

    #[test]
    fn test_default_public_routes_include_root_and_login() {
        let edge = EdgeConfig::default();
        assert!(edge.public_routes.iter().any(|r| r == "/"));
        assert!(edge.public_routes.iter().any(|r| r == "/auth/login"));
        assert!(!edge.verify_expiry);
    }
}
