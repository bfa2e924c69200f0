//! Request guards for protected and guest-only routes.
//!
//! ```ignore
//! let protected = Router::new()
//!     .route("/v1/me", get(me))
//!     .route_layer(middleware::from_fn(require_authenticated));
//! ```
//!
//! Both guards read the [`SessionManager`] from request extensions, so the
//! `Extension` layer must wrap the guarded routes.

use crate::auth::{cookie::extract_refresh_cookie, error::AuthError, manager::SessionManager};
use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;

const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization` value of exactly `Bearer <token>`.
///
/// # Errors
/// Returns [`AuthError::MalformedHeader`] for any other shape, including a
/// lowercase scheme, extra spaces, or an empty token.
pub fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Admit only requests carrying a valid access token; the resolved
/// [`Identity`](crate::auth::Identity) is added to request extensions.
pub async fn require_authenticated(
    Extension(manager): Extension<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match request.headers().get(AUTHORIZATION) {
        None => manager.authenticate(None),
        Some(value) => match value.to_str() {
            Ok(header) => manager.authenticate(Some(header)),
            Err(_) => Err(AuthError::MalformedHeader),
        },
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Turn away requests that already present credentials. Presence alone
/// counts; nothing is verified.
pub async fn reject_authenticated(
    Extension(manager): Extension<Arc<SessionManager>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let has_bearer = headers.contains_key(AUTHORIZATION);
    let has_cookie =
        extract_refresh_cookie(headers, manager.config().refresh_cookie_name()).is_some();
    if has_bearer || has_cookie {
        return AuthError::AlreadyAuthenticated.into_response();
    }
    next.run(request).await
}
