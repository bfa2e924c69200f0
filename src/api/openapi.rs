use super::handlers::{auth, health, me};
use crate::auth::guard::{reject_authenticated, require_authenticated};
use axum::middleware;
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Routes are grouped by guard: guest-only routes refuse callers that already
/// present credentials, protected routes require a valid bearer token.
pub(crate) fn api_router() -> OpenApiRouter {
    let guest = OpenApiRouter::new()
        .routes(routes!(auth::sign_in))
        .route_layer(middleware::from_fn(reject_authenticated));

    let protected = OpenApiRouter::new()
        .routes(routes!(me::me))
        .routes(routes!(auth::logout_all))
        .route_layer(middleware::from_fn(require_authenticated));

    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::refresh))
        .routes(routes!(auth::logout))
        .merge(guest)
        .merge(protected);

    let openapi = router.get_openapi_mut();
    openapi.tags = Some(vec![
        tag("auth", "Sign-in, session rotation and logout"),
        tag("me", "Authenticated identity"),
        tag("health", "Service health and build info"),
    ]);
    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = primary_author(env!("CARGO_PKG_AUTHORS")).map(|(name, email)| {
        let mut contact = Contact::new();
        contact.name = name.map(str::to_string);
        contact.email = email.map(str::to_string);
        contact
    });
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

/// First Cargo author split into name and email; `None` when neither is present.
fn primary_author(authors: &str) -> Option<(Option<&str>, Option<&str>)> {
    let primary = non_empty(authors.split(';').next()?)?;
    let parsed = match primary.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (Some(primary), None),
    };
    Some(parsed)
}
