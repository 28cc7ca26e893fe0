//! Session cookie store.
//!
//! The only client-side credential is the upstream bearer token, kept in a
//! single HttpOnly cookie. Nothing is stored server side.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::error::ApiError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "auth_token";

/// Issues and clears the session cookie with consistent attributes.
#[derive(Debug, Clone, Copy)]
pub struct SessionCookies {
    secure: bool,
}

impl SessionCookies {
    #[must_use]
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// Read the session token. An empty cookie counts as no session.
    #[must_use]
    pub fn token(jar: &CookieJar) -> Option<String> {
        jar.get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Add the session cookie. Without `max_age` it lives as long as the
    /// browser session.
    #[must_use]
    pub fn issue(&self, jar: CookieJar, token: &str, max_age: Option<Duration>) -> CookieJar {
        let mut cookie = self.base_cookie(token.to_owned());
        if let Some(max_age) = max_age {
            cookie.set_max_age(max_age);
        }
        jar.add(cookie)
    }

    /// Expire the session cookie. Idempotent.
    #[must_use]
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = self.base_cookie(String::new());
        cookie.set_max_age(Duration::ZERO);
        jar.add(cookie)
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build()
    }
}

/// Extractor for handlers that must not run without a session.
///
/// Rejects with `401` before the handler body runs, so no upstream call is
/// made for anonymous requests.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        SessionCookies::token(&jar)
            .map(Self)
            .ok_or_else(ApiError::not_authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};

    fn jar_with(cookie: &'static str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_token_reads_session_cookie() {
        let jar = jar_with("theme=dark; auth_token=abc123");
        assert_eq!(SessionCookies::token(&jar).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_empty_cookie_is_no_session() {
        assert_eq!(SessionCookies::token(&jar_with("auth_token=")), None);
        assert_eq!(SessionCookies::token(&CookieJar::new()), None);
    }

    #[test]
    fn test_issue_sets_http_only_lax_cookie() {
        let jar = SessionCookies::new(false).issue(CookieJar::new(), "abc", None);
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), None);
        assert_ne!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_issue_secure_with_max_age() {
        let jar = SessionCookies::new(true).issue(CookieJar::new(), "abc", Some(Duration::hours(1)));
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::hours(1)));
    }

    #[test]
    fn test_clear_expires_cookie() {
        let sessions = SessionCookies::new(false);
        let jar = sessions.clear(jar_with("auth_token=abc"));
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(SessionCookies::token(&jar), None);
    }
}
