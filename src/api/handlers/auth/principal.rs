//! Authenticated admin extraction for privileged handlers.
//!
//! Flow Overview: read the session cookie, verify signature and expiry with the
//! shared codec, and hand the identity to the handler. Any handler that takes
//! an `AdminSession` argument is admin-only.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{session::extract_session_token, state::AuthState, types::error_response};

const NOT_LOGGED_IN: &str = "Not logged in.";
const SESSION_EXPIRED: &str = "Session expired. Please log in again.";

/// Identity taken from a valid session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminSession {
    pub user: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionRejection {
    /// No session cookie at all.
    Missing,
    /// A cookie was sent but is forged, malformed or expired.
    Invalid,
    /// The router was built without auth state.
    Unconfigured,
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Missing => error_response(StatusCode::UNAUTHORIZED, NOT_LOGGED_IN),
            Self::Invalid => error_response(StatusCode::UNAUTHORIZED, SESSION_EXPIRED),
            Self::Unconfigured => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Resolve the session cookie into an admin identity.
///
/// # Errors
/// Returns the rejection describing why the request is not authenticated.
pub fn require_auth(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<AdminSession, SessionRejection> {
    let token = extract_session_token(headers).ok_or(SessionRejection::Missing)?;
    match auth_state.codec().verify(&token) {
        Some(user) => Ok(AdminSession { user }),
        None => {
            debug!("Rejected invalid or expired session cookie");
            Err(SessionRejection::Invalid)
        }
    }
}

impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(auth_state) = parts.extensions.get::<Arc<AuthState>>() else {
            error!("Auth state missing from request extensions");
            return Err(SessionRejection::Unconfigured);
        };
        require_auth(&parts.headers, auth_state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::{
        state::AuthConfig,
        storage::MemoryThrottleStore,
        throttle::{LoginThrottle, ThrottleConfig},
    };
    use super::*;
    use axum::http::{HeaderValue, Request, header::COOKIE};
    use secrecy::SecretString;

    fn auth_state() -> Arc<AuthState> {
        let config =
            AuthConfig::new().with_admin_password(Some(SecretString::from("pw".to_string())));
        let throttle = LoginThrottle::new(
            ThrottleConfig::default(),
            Box::new(MemoryThrottleStore::new()),
        );
        Arc::new(AuthState::new(config, Arc::new(throttle)).unwrap())
    }

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("elephants_session={token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn require_auth_accepts_signed_cookie() {
        let state = auth_state();
        let token = state.codec().sign(&state.codec().create_payload("admin")).unwrap();
        let session = require_auth(&cookie_headers(&token), &state).unwrap();
        assert_eq!(session.user, "admin");
    }

    #[test]
    fn require_auth_distinguishes_missing_from_invalid() {
        let state = auth_state();
        assert_eq!(
            require_auth(&HeaderMap::new(), &state),
            Err(SessionRejection::Missing)
        );
        assert_eq!(
            require_auth(&cookie_headers("forged.token"), &state),
            Err(SessionRejection::Invalid)
        );
    }

    #[test]
    fn require_auth_rejects_expired_cookie() {
        let state = auth_state();
        let payload = state.codec().create_payload_at("admin", 0);
        let token = state.codec().sign(&payload).unwrap();
        assert_eq!(
            require_auth(&cookie_headers(&token), &state),
            Err(SessionRejection::Invalid)
        );
    }

    #[test]
    fn rejections_map_to_status() {
        assert_eq!(
            SessionRejection::Missing.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SessionRejection::Invalid.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SessionRejection::Unconfigured.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn extractor_reads_state_from_extensions() {
        let state = auth_state();
        let token = state.codec().sign(&state.codec().create_payload("admin")).unwrap();
        let request = Request::builder()
            .header(COOKIE, format!("elephants_session={token}"))
            .extension(state)
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        let session = AdminSession::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(session.user, "admin");
    }

    #[tokio::test]
    async fn extractor_without_state_is_server_error() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        let rejection = AdminSession::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(rejection, SessionRejection::Unconfigured);
    }
}
