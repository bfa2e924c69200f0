//! Auth error taxonomy and its HTTP mapping.

use crate::auth::{
    backend::BackendError,
    codec::{KeyError, TokenError},
    store::StoreError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Malformed token claims")]
    MalformedClaims,

    #[error("Token expired")]
    Expired,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Already authenticated")]
    AlreadyAuthenticated,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code sent alongside the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedClaims => "malformed_claims",
            Self::Expired => "expired",
            Self::SessionRevoked => "session_revoked",
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AlreadyAuthenticated => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::Expired => Self::Expired,
            TokenError::MalformedClaims => Self::MalformedClaims,
            TokenError::Encoding(err) => Self::Internal(format!("token encoding error: {err}")),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::SessionRevoked,
            StoreError::Backend(err) => err.into(),
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        Self::Internal(format!("session backend error: {err}"))
    }
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        Self::Internal(err.to_string())
    }
}
