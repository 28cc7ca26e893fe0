//! Authentication endpoints.
//!
//! These are thin pass-throughs to the upstream `/auth/*` API, except that
//! login issues the session cookie, logout clears it, and the current-user
//! lookup clears it when the upstream has stopped accepting the token.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use bytes::Bytes;
use serde_json::{json, Value};
use time::Duration;

use super::proxy::ProxyRequest;
use super::session::{SessionCookies, SessionToken};
use crate::error::{method_not_allowed, ApiError};
use crate::AppState;

/// Authentication routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login).fallback(method_not_allowed))
        .route("/api/auth/logout", post(logout).fallback(method_not_allowed))
        .route("/api/auth/register", post(register).fallback(method_not_allowed))
        .route("/api/auth/me", get(current_user).fallback(method_not_allowed))
        .route(
            "/api/auth/forgot-password",
            post(forgot_password).fallback(method_not_allowed),
        )
        .route(
            "/api/auth/reset-password",
            post(reset_password).fallback(method_not_allowed),
        )
        .route(
            "/api/auth/update-password",
            post(update_password)
                .put(update_password)
                .fallback(method_not_allowed),
        )
        .route("/api/auth/refresh", post(refresh_session).fallback(method_not_allowed))
        .route("/api/auth/verify-email", post(verify_email).fallback(method_not_allowed))
}

/// Parse a JSON object body. The parsed value is what gets forwarded, so
/// the request stream is consumed only once.
fn json_object(body: &Bytes) -> Result<Value, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(ApiError::BadRequest("Request body must be a JSON object".to_string())),
    }
}

/// A non-blank string field.
fn field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Cookie lifetime, when the upstream states one in seconds.
fn session_max_age(body: &Value) -> Option<Duration> {
    body.get("expiresIn")
        .or_else(|| body.get("expires_in"))
        .and_then(Value::as_i64)
        .filter(|secs| *secs > 0)
        .map(Duration::seconds)
}

/// Log in against the upstream and mint the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, ApiError> {
    let credentials = json_object(&body)?;
    if field(&credentials, "email").is_none() || field(&credentials, "password").is_none() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let upstream = state
        .gateway
        .forward(ProxyRequest::post("/auth/login").json(credentials), None, None)
        .await?;

    if upstream.status == StatusCode::OK {
        let issued = upstream.json().and_then(|body| {
            let token = body.get("token").and_then(Value::as_str)?;
            Some((token.to_owned(), session_max_age(body)))
        });

        if let Some((token, max_age)) = issued {
            tracing::info!(session_bound = max_age.is_none(), "Login succeeded, session issued");
            let jar = state.sessions.issue(jar, &token, max_age);
            return Ok((jar, upstream).into_response());
        }
    }

    tracing::info!(status = upstream.status.as_u16(), "Login relayed without session");
    Ok(upstream.into_response())
}

/// Clear the session cookie. Always succeeds.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let had_session = SessionCookies::token(&jar).is_some();
    tracing::info!(had_session, "Logout");

    (
        state.sessions.clear(jar),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

/// Create an account. Account creation is an administrative action, so the
/// caller's session is forwarded when present.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, ApiError> {
    let account = json_object(&body)?;
    let token = SessionCookies::token(&jar);

    Ok(state
        .gateway
        .relay(
            ProxyRequest::post("/auth/register").with_auth().json(account),
            token.as_deref(),
            None,
        )
        .await)
}

/// Current user. An upstream `401` clears the local cookie in the same
/// response, so the browser never keeps a credential the upstream revoked.
pub async fn current_user(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let upstream = state
        .gateway
        .forward(ProxyRequest::get("/auth/me").with_auth(), Some(&token), None)
        .await?;

    if upstream.status == StatusCode::UNAUTHORIZED {
        tracing::info!("Upstream rejected session token, clearing cookie");
        return Ok((state.sessions.clear(jar), upstream).into_response());
    }

    Ok(upstream.into_response())
}

pub async fn forgot_password(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = json_object(&body)?;
    if field(&request, "email").is_none() {
        return Err(ApiError::BadRequest("Email is required".to_string()));
    }

    Ok(state
        .gateway
        .relay(ProxyRequest::post("/auth/forgot-password").json(request), None, None)
        .await)
}

pub async fn reset_password(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = json_object(&body)?;
    let has_password =
        field(&request, "password").is_some() || field(&request, "newPassword").is_some();
    if field(&request, "token").is_none() || !has_password {
        return Err(ApiError::BadRequest(
            "Reset token and new password are required".to_string(),
        ));
    }

    Ok(state
        .gateway
        .relay(ProxyRequest::post("/auth/reset-password").json(request), None, None)
        .await)
}

/// Change the password of the signed-in user.
pub async fn update_password(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = json_object(&body)?;

    Ok(state
        .gateway
        .relay(
            ProxyRequest::put("/auth/update-password").with_auth().json(request),
            Some(&token),
            None,
        )
        .await)
}

pub async fn refresh_session() -> ApiError {
    ApiError::NotImplemented(
        "Session refresh is not available yet; sign in again to obtain a new session".to_string(),
    )
}

pub async fn verify_email() -> ApiError {
    ApiError::NotImplemented("Email verification is not available yet".to_string())
}
