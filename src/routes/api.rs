use crate::{handlers::{diagnostics, health_check, publish_to_channel, publish_to_org, ready_check}, routes::auth_middleware::auth_middleware, state::AppState};
use axum::{routing::{get, post}, Router, middleware};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::<AppState>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/orgs/:org_id/events", post(publish_to_org))
        .route("/v1/orgs/:org_id/channels/:channel_id/events", post(publish_to_channel))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware)); // Applies to all routes added above

    Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .merge(protected)
}
