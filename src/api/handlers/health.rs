use crate::{auth::SessionManager, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, Instrument, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    sessions: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Session backend is reachable", body = Health),
        (status = 503, description = "Session backend is unreachable", body = Health)
    ),
    tag = "health"
)]
pub async fn health(
    method: Method,
    Extension(manager): Extension<Arc<SessionManager>>,
) -> impl IntoResponse {
    let ping_span = info_span!("sessions.ping");
    let result = manager.store().ping().instrument(ping_span).await;
    if let Err(err) = &result {
        error!("Session backend unhealthy: {err}");
    } else {
        debug!("Session backend is healthy");
    }

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: if result.is_ok() { "ok" } else { "error" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        health.commit.get(..7).unwrap_or_default()
    } else {
        ""
    };
    let mut headers = HeaderMap::new();
    match format!("{}:{}:{short_hash}", health.name, health.version).parse::<HeaderValue>() {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to parse X-App header: {err}"),
    }

    let status = if result.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{backend::MemoryBackend, manager::tests::manager_with, AuthConfig};
    use axum::{http::Request, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        let manager = Arc::new(manager_with(
            AuthConfig::new(),
            Arc::new(MemoryBackend::new()),
        ));
        Router::new()
            .route("/health", get(health).options(health))
            .layer(Extension(manager))
    }

    #[tokio::test]
    async fn get_reports_build_info() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let x_app = response.headers().get("X-App").unwrap().to_str().unwrap();
        assert!(x_app.starts_with(concat!(env!("CARGO_PKG_NAME"), ":", env!("CARGO_PKG_VERSION"))));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(json["sessions"], "ok");
        assert_eq!(json["commit"], GIT_COMMIT_HASH);
    }

    #[tokio::test]
    async fn options_has_empty_body() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-App"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
