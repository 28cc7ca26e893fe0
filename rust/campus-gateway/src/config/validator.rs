//! Configuration validation.
//!
//! Every rule runs; all failures are reported together so an operator can
//! fix a deployment in one pass.

use url::Url;

use super::error::{ConfigResult, ConfigurationError};
use super::{AppConfig, EdgeConfig, UploadsConfig};

/// Configuration validator.
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_upstream(config.upstream.base_url.as_deref()) {
            errors.push(e);
        }

        errors.extend(Self::validate_uploads(&config.uploads));
        errors.extend(Self::validate_edge(&config.edge));

        if config.server.max_body_bytes == 0 {
            errors.push(ConfigurationError::invalid(
                "server.max_body_bytes is 0, every upload would be rejected",
                "Set CAMPUS__SERVER__MAX_BODY_BYTES to a positive size in bytes",
            ));
        }

        ConfigurationError::collect(errors)
    }

    /// The upstream base URL must be present and an absolute http(s) URL.
    pub fn validate_upstream(base_url: Option<&str>) -> ConfigResult<()> {
        let Some(base_url) = base_url else {
            return Err(ConfigurationError::missing_required(
                "Upstream base URL",
                "Forwarding requests to the backend API",
                "BACKEND_API_URL or NEXT_PUBLIC_API_URL",
            ));
        };

        match Url::parse(base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            Ok(url) => Err(ConfigurationError::invalid(
                format!("upstream base URL uses unsupported scheme '{}'", url.scheme()),
                "Use an http:// or https:// URL",
            )),
            Err(e) => Err(ConfigurationError::invalid(
                format!("upstream base URL '{base_url}' is not an absolute URL: {e}"),
                "Use a full URL such as http://localhost:5000/api",
            )),
        }
    }

    fn validate_uploads(uploads: &UploadsConfig) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();

        if !uploads.public_prefix.starts_with('/') || uploads.public_prefix.len() < 2 {
            errors.push(ConfigurationError::invalid(
                format!(
                    "uploads.public_prefix '{}' must be an absolute path below the root",
                    uploads.public_prefix
                ),
                "Use a prefix such as /uploads",
            ));
        }

        if let Some(base) = uploads.public_base_url.as_deref() {
            if Url::parse(base).is_err() {
                errors.push(ConfigurationError::invalid(
                    format!("uploads.public_base_url '{base}' is not an absolute URL"),
                    "Use an origin such as https://campus.example.edu",
                ));
            }
        }

        errors
    }

    fn validate_edge(edge: &EdgeConfig) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();

        for (setting, value) in [
            ("edge.login_path", &edge.login_path),
            ("edge.dashboard_path", &edge.dashboard_path),
        ] {
            if !value.starts_with('/') {
                errors.push(ConfigurationError::invalid(
                    format!("{setting} '{value}' is not an absolute path"),
                    "Paths must start with '/'",
                ));
            }
        }

        for route in edge.public_routes.iter().filter(|r| !r.starts_with('/')) {
            errors.push(ConfigurationError::invalid(
                format!("public route '{route}' is not an absolute path"),
                "Every entry of edge.public_routes must start with '/'",
            ));
        }

        errors
    }
}
