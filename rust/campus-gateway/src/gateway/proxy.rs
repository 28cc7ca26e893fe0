//! Backend proxy: builds, dispatches and relays a single upstream call.
//!
//! The upstream owns every authorization decision. This layer attaches the
//! session token when asked to, forwards exactly once, and hands back the
//! upstream status and body untouched. Transport and decode failures become
//! a generic `500` so upstream infrastructure details never reach a browser.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{self, InvalidHeaderValue},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::ApiError;

/// Errors raised while talking to the upstream service.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("upstream base URL is not configured")]
    MissingBaseUrl,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("session token cannot be sent as a header: {0}")]
    InvalidToken(#[source] InvalidHeaderValue),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Request body handed to the upstream.
#[derive(Debug, Clone, Default)]
pub enum ProxyBody {
    #[default]
    Empty,
    /// Already-parsed JSON, sent with `Content-Type: application/json`.
    Json(Value),
    /// Buffered bytes sent as-is with their original content type.
    Raw {
        bytes: Bytes,
        content_type: Option<HeaderValue>,
    },
}

/// Per-call forwarding descriptor.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Path appended to the upstream base URL, starting with `/`.
    pub path: String,
    pub method: Method,
    /// Attach `Authorization: Bearer <token>` when a token is available.
    pub include_auth: bool,
    pub body: ProxyBody,
}

impl ProxyRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            include_auth: false,
            body: ProxyBody::Empty,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn with_auth(mut self) -> Self {
        self.include_auth = true;
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = ProxyBody::Json(body);
        self
    }

    #[must_use]
    pub fn raw(mut self, bytes: Bytes, content_type: Option<HeaderValue>) -> Self {
        self.body = ProxyBody::Raw {
            bytes,
            content_type,
        };
        self
    }
}

/// Decoded upstream payload.
#[derive(Debug, Clone)]
pub enum UpstreamBody {
    Empty,
    Json(Value),
    /// Non-JSON payload such as an exported report.
    Binary {
        bytes: Bytes,
        content_type: Option<HeaderValue>,
        content_disposition: Option<HeaderValue>,
    },
}

/// Upstream status and body, relayed to the browser unchanged.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    /// The JSON body, if the upstream sent one.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            UpstreamBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        match self.body {
            UpstreamBody::Json(value) => (self.status, Json(value)).into_response(),
            UpstreamBody::Empty => self.status.into_response(),
            UpstreamBody::Binary {
                bytes,
                content_type,
                content_disposition,
            } => {
                let mut response = (self.status, bytes).into_response();
                let headers = response.headers_mut();
                if let Some(content_type) = content_type {
                    headers.insert(header::CONTENT_TYPE, content_type);
                }
                if let Some(disposition) = content_disposition {
                    headers.insert(header::CONTENT_DISPOSITION, disposition);
                }
                response
            }
        }
    }
}

/// Forwarding client for the upstream service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl Gateway {
    pub fn new(config: &UpstreamConfig) -> Result<Self, GatewayError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or(GatewayError::MissingBaseUrl)?;

        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| concat!("campus-gateway/", env!("CARGO_PKG_VERSION")).to_string());

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').into(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL + path, with the query string appended verbatim.
    #[must_use]
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = String::with_capacity(self.base_url.len() + path.len() + 1 + query.map_or(0, str::len));
        url.push_str(&self.base_url);
        url.push_str(path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Forward one request upstream. Non-2xx responses are `Ok`; only
    /// transport and decode failures are errors. No retries.
    pub async fn forward(
        &self,
        request: ProxyRequest,
        token: Option<&str>,
        query: Option<&str>,
    ) -> Result<UpstreamResponse, GatewayError> {
        let url = self.url_for(&request.path, query);
        let mut builder = self.client.request(request.method.clone(), &url);

        let mut authorized = false;
        if request.include_auth {
            if let Some(token) = token {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(GatewayError::InvalidToken)?;
                builder = builder.header(header::AUTHORIZATION, value);
                authorized = true;
            }
        }

        builder = match request.body {
            ProxyBody::Empty => builder,
            ProxyBody::Json(value) => builder.json(&value),
            ProxyBody::Raw {
                bytes,
                content_type,
            } => {
                let builder = match content_type {
                    Some(content_type) => builder.header(header::CONTENT_TYPE, content_type),
                    None => builder,
                };
                builder.body(bytes)
            }
        };

        let response = builder.send().await.inspect_err(|e| {
            tracing::warn!(method = %request.method, path = %request.path, error = %e, "Upstream unreachable");
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            authorized,
            "Upstream call completed"
        );

        Ok(UpstreamResponse {
            status,
            body: decode_body(&headers, bytes)?,
        })
    }

    /// [`Self::forward`] with failures folded into the `500` envelope.
    pub async fn relay(&self, request: ProxyRequest, token: Option<&str>, query: Option<&str>) -> Response {
        match self.forward(request, token, query).await {
            Ok(upstream) => upstream.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// Bodies without a content type are expected to be JSON, like the rest of
/// the upstream API.
fn decode_body(headers: &HeaderMap, bytes: Bytes) -> Result<UpstreamBody, GatewayError> {
    if bytes.is_empty() {
        return Ok(UpstreamBody::Empty);
    }

    let content_type = headers.get(header::CONTENT_TYPE).cloned();
    if content_type.as_ref().is_none_or(is_json) {
        return Ok(UpstreamBody::Json(serde_json::from_slice(&bytes)?));
    }

    Ok(UpstreamBody::Binary {
        bytes,
        content_type,
        content_disposition: headers.get(header::CONTENT_DISPOSITION).cloned(),
    })
}

/// `application/json` and `application/*+json`, parameters ignored.
pub(crate) fn is_json(value: &HeaderValue) -> bool {
    value.to_str().is_ok_and(|s| {
        let mime = s.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
    })
}
