use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use crate::handlers;
use crate::models::*;

/// Registers the bearer scheme referenced by the protected routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT or ahq_ API key")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::ready_check,
        handlers::diagnostics::diagnostics,
        handlers::publish::publish_to_org,
        handlers::publish::publish_to_channel,
    ),
    components(
        schemas(HealthResponse, ReadyResponse, DiagnosticsResponse, PublishRequest, PublishResponse, ErrorResponse)
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
