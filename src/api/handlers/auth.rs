//! Sign-in, refresh and logout endpoints.
//!
//! Flow Overview:
//! 1) `signin` checks credentials, returns an access token and sets the refresh cookie.
//! 2) `refresh` rotates the cookie's session into a new pair.
//! 3) `logout` ends the cookie's session; `logout-all` ends every session of the caller.
//!
//! The refresh cookie is cleared whenever the presented session is unusable.

use crate::auth::{
    cookie::{clear_refresh_cookie, extract_refresh_cookie, refresh_cookie},
    AuthError, Identity, IssuedSession, SessionManager,
};
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Body of every auth error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in; refresh cookie set", body = TokenResponse),
        (status = 400, description = "Request already carries credentials", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Session could not be recorded", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn sign_in(
    Extension(manager): Extension<Arc<SessionManager>>,
    Json(request): Json<SignInRequest>,
) -> Response {
    match manager.sign_in(&request.email, &request.password).await {
        Ok(session) => session_response(&manager, &session),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "Session rotated", body = TokenResponse),
        (status = 401, description = "Session invalid or revoked", body = ErrorResponse),
        (status = 500, description = "Session could not be recorded", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    Extension(manager): Extension<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_refresh_cookie(&headers, manager.config().refresh_cookie_name())
    else {
        return (cleared_cookie(&manager), AuthError::SessionRevoked).into_response();
    };

    match manager.rotate_session(&token).await {
        Ok(session) => session_response(&manager, &session),
        // Cookie stays on backend failure.
        Err(err @ AuthError::Internal(_)) => err.into_response(),
        Err(err) => {
            debug!("refresh rejected: {err}");
            (cleared_cookie(&manager), err).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session ended; refresh cookie cleared"),
        (status = 500, description = "Session could not be deleted", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(manager): Extension<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Response {
    let cleared = cleared_cookie(&manager);
    let Some(token) = extract_refresh_cookie(&headers, manager.config().refresh_cookie_name())
    else {
        return (StatusCode::NO_CONTENT, cleared).into_response();
    };

    match manager.end_session(&token).await {
        Ok(()) => (StatusCode::NO_CONTENT, cleared).into_response(),
        Err(err) => (cleared, err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "Every session of the caller ended; refresh cookie cleared"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 500, description = "Sessions could not be deleted", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_all(
    Extension(manager): Extension<Arc<SessionManager>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match manager.end_all_sessions(&identity).await {
        Ok(_) => (StatusCode::NO_CONTENT, cleared_cookie(&manager)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn session_response(manager: &SessionManager, session: &IssuedSession) -> Response {
    let cookie = match refresh_cookie(manager.config(), &session.refresh_token) {
        Ok(cookie) => cookie,
        Err(err) => {
            return AuthError::Internal(format!("failed to build refresh cookie: {err}"))
                .into_response();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    let body = TokenResponse {
        access_token: session.access_token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: manager.config().access_ttl_seconds(),
    };
    (StatusCode::OK, headers, Json(body)).into_response()
}

fn cleared_cookie(manager: &SessionManager) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match clear_refresh_cookie(manager.config()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build cleared refresh cookie: {err}"),
    }
    headers
}
