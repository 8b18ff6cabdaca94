use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

/// Resolve the caller from a bearer token (JWT or API key) or the
/// `auth_token` cookie, and expose it to handlers as an `Identity` extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(e) => {
            debug!("Rejecting request without credential: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 2. Resolve the identity
    let identity = match state.auth.authenticate(&token) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Authentication failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    debug!("Authenticated {} {} for org {}", identity.kind, identity.id, identity.org_id);

    // 3. Make it available to downstream handlers
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
