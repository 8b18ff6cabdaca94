pub mod api;
pub mod auth_middleware;

use axum::{routing::get, Router};
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::state::AppState;
use crate::ws::websocket_handler;

pub use api::create_api_routes;

/// Build the full application router: REST API, realtime endpoint and docs.
pub fn build_router(state: AppState) -> Router {
    let ws_path = state.config.ws_path.clone();
    let cors = cors_layer(&state.config.cors_origin_list());

    let router = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(state.clone()))
        // Realtime endpoint
        .route(&ws_path, get(websocket_handler))
        .with_state(state)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
