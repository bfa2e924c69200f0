//! Refresh cookie construction and parsing.

use crate::auth::config::AuthConfig;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Build the `HttpOnly` cookie carrying the refresh token.
///
/// # Errors
/// Returns an error if the token contains bytes not allowed in a header value.
pub fn refresh_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.refresh_cookie_name();
    let ttl_seconds = config.refresh_ttl_seconds();
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={ttl_seconds}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build a `Set-Cookie` value that removes the refresh cookie.
///
/// # Errors
/// Returns an error if the configured cookie name is not a valid header value.
pub fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.refresh_cookie_name();
    let mut cookie = format!(
        "{name}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Expires={EPOCH_EXPIRES}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Find the named cookie across all `Cookie` headers. Empty values count as absent.
#[must_use]
pub fn extract_refresh_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            let val = val.trim();
            (key.trim() == name && !val.is_empty()).then(|| val.to_string())
        })
}
