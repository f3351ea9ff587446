//! Admin login endpoint.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{RETRY_AFTER, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    session::session_cookie,
    state::AuthState,
    throttle::{ThrottleDecision, run_blocking},
    types::{ErrorResponse, LoginRequest, LoginResponse, error_response},
    utils::ClientIp,
};

const TOO_MANY_ATTEMPTS: &str = "Too many failed attempts. Try again later.";
const INVALID_CREDENTIALS: &str = "Invalid credentials.";

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts from this address", body = ErrorResponse,
            headers(("Retry-After" = u64, description = "Seconds until the block ends")))
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    let ip = client_ip.clone();
    let decision = run_blocking(auth_state.throttle(), move |throttle| {
        throttle.classify(ip.as_deref())
    })
    .await;
    if let ThrottleDecision::Blocked {
        retry_after_seconds,
    } = decision
    {
        warn!(ip = client_ip.as_deref(), retry_after_seconds, "Login blocked");
        let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_ATTEMPTS);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        return response;
    }

    // A body that does not parse is just another wrong guess.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Unreadable login payload: {rejection}");
            LoginRequest::default()
        }
    };

    if !auth_state.credentials_match(&request.user, &request.password) {
        let ip = client_ip.clone();
        run_blocking(auth_state.throttle(), move |throttle| {
            throttle.record_failure(ip.as_deref());
        })
        .await;
        info!(ip = client_ip.as_deref(), "Failed login");
        return error_response(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS);
    }

    let ip = client_ip.clone();
    run_blocking(auth_state.throttle(), move |throttle| {
        throttle.record_success(ip.as_deref());
    })
    .await;

    let user = request.user.trim().to_string();
    let codec = auth_state.codec();
    let cookie = match codec
        .sign(&codec.create_payload(&user))
        .map_err(|err| err.to_string())
        .and_then(|token| {
            session_cookie(auth_state.config(), &token).map_err(|err| err.to_string())
        }) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to issue session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(ip = client_ip.as_deref(), user = %user, "Successful login");
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    (
        StatusCode::OK,
        headers,
        Json(LoginResponse { ok: true, user }),
    )
        .into_response()
}
