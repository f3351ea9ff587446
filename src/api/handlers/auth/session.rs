//! Session cookie helpers plus the `me` and `logout` endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    principal::AdminSession,
    state::{AuthConfig, AuthState},
    types::{ErrorResponse, MeResponse, OkResponse},
};

pub const SESSION_COOKIE_NAME: &str = "elephants_session";

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Session is active", body = MeResponse),
        (status = 401, description = "Missing, invalid or expired session", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(session: AdminSession) -> impl IntoResponse {
    Json(MeResponse { user: session.user })
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = OkResponse)
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Tokens are stateless; clearing the cookie is all there is to do.
    let mut response_headers = HeaderMap::new();
    match clear_session_cookie(auth_state.config()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    debug!("Session cookie cleared");
    (
        StatusCode::OK,
        response_headers,
        Json(OkResponse { ok: true }),
    )
}

/// Build the `HttpOnly` cookie carrying a signed session token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session token from the request cookies, if any.
///
/// Every `Cookie` header is scanned; an empty value counts as absent.
pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(&AuthConfig::new(), "abc.def").unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "elephants_session=abc.def; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400"
        );
    }

    #[test]
    fn session_cookie_secure_flag() {
        let config = AuthConfig::new()
            .with_session_cookie_secure(true)
            .with_session_ttl_seconds(60);
        let cookie = session_cookie(&config, "t").unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "elephants_session=t; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie(&AuthConfig::new()).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "elephants_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
    }

    #[test]
    fn session_cookie_rejects_header_breaking_token() {
        assert!(session_cookie(&AuthConfig::new(), "bad\nvalue").is_err());
    }

    #[test]
    fn extract_token_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; elephants_session=abc.def; lang=cs"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn extract_token_from_second_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("elephants_session=xyz"));
        assert_eq!(extract_session_token(&headers), Some("xyz".to_string()));
    }

    #[test]
    fn extract_token_missing_or_empty() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("theme; elephants_session="));
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("other_session=abc"));
        assert_eq!(extract_session_token(&headers), None);
    }
}
