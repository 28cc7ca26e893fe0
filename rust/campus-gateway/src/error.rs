//! Uniform error envelope returned by every handler.
//!
//! Bodies look like `{ "error": "...", "message": "..." }`; `message` is only
//! present for placeholder endpoints. Internal failures are logged and never
//! described to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Handler-level failure classes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed client input.
    #[error("{0}")]
    BadRequest(String),
    /// No session where one is required.
    #[error("{0}")]
    Unauthorized(String),
    /// Placeholder endpoint.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("not found")]
    NotFound,
    /// Known route, unsupported method.
    #[error("method not allowed")]
    MethodNotAllowed,
    /// Transport, decode or storage failure. The detail is logged only.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    /// Shorthand for the missing-session rejection.
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::Unauthorized("Not authenticated".to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(error) | Self::Unauthorized(error) => ErrorBody {
                error,
                message: None,
            },
            Self::NotImplemented(message) => ErrorBody {
                error: "Not implemented".to_string(),
                message: Some(message),
            },
            Self::NotFound => ErrorBody {
                error: "Not found".to_string(),
                message: None,
            },
            Self::MethodNotAllowed => ErrorBody {
                error: "Method not allowed".to_string(),
                message: None,
            },
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                ErrorBody {
                    error: "Internal server error".to_string(),
                    message: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Method fallback for routes with a fixed method set.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
