use crate::auth::Identity;
use axum::{extract::Extension, Json};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Identity carried by the access token.", body = Identity),
        (status = 401, description = "Missing, malformed or invalid bearer token."),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}
