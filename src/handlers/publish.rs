use crate::{auth::{ensure_org_member, Identity}, models::{api_error, ApiError, Envelope, EventKind, PublishRequest, PublishResponse, ServerEvent}, state::AppState};
use axum::{extract::{State, Path, Extension}, http::StatusCode, Json};
use tracing::{info, warn};

/// Broadcast a domain event to every connection of an organization
#[utoipa::path(
    post,
    path = "/api/v1/orgs/{org_id}/events",
    params(("org_id" = String, Path, description = "Organization id")),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Event queued", body = PublishResponse),
        (status = 400, description = "Unknown event or malformed payload", body = ErrorResponse),
        (status = 403, description = "Caller belongs to another organization", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn publish_to_org(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(org_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    ensure_org_member(&identity, &org_id)?;
    let event = parse_domain_event(request)?;

    let delivered = state.hub.broadcast_to_org(&org_id, &event).await;
    info!("{} {} published {} to org {} ({} delivered)", identity.kind, identity.id, event.kind(), org_id, delivered);

    Ok((StatusCode::OK, Json(PublishResponse {
        event: event.kind().to_string(),
        delivered: delivered as u32,
    })))
}

/// Broadcast a domain event to the subscribers of one channel
#[utoipa::path(
    post,
    path = "/api/v1/orgs/{org_id}/channels/{channel_id}/events",
    params(
        ("org_id" = String, Path, description = "Organization id"),
        ("channel_id" = String, Path, description = "Channel id")
    ),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Event queued", body = PublishResponse),
        (status = 400, description = "Unknown event or malformed payload", body = ErrorResponse),
        (status = 403, description = "Caller belongs to another organization", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn publish_to_channel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((org_id, channel_id)): Path<(String, String)>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    ensure_org_member(&identity, &org_id)?;
    let event = parse_domain_event(request)?;

    if let ServerEvent::PostNew(post) = &event {
        if post.channel_id != channel_id {
            warn!("post:new for channel {} published to channel {}", post.channel_id, channel_id);
        }
    }

    let delivered = state.hub.broadcast_to_channel(&org_id, &channel_id, &event).await;
    info!("{} {} published {} to channel {} ({} delivered)", identity.kind, identity.id, event.kind(), channel_id, delivered);

    Ok((StatusCode::OK, Json(PublishResponse {
        event: event.kind().to_string(),
        delivered: delivered as u32,
    })))
}

/// Only domain events with a well-formed payload may be published.
fn parse_domain_event(request: PublishRequest) -> Result<ServerEvent, ApiError> {
    match EventKind::from_name(&request.event) {
        Some(kind) if kind.is_domain_event() => {}
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown event '{}'", request.event),
            ));
        }
    }

    ServerEvent::from_envelope(Envelope { event: request.event, data: request.data })
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_known_domain_event() {
        let event = parse_domain_event(PublishRequest {
            event: "agent:status".to_string(),
            data: json!({ "agentId": "agent-1", "status": "idle" }),
        })
        .unwrap();
        assert_eq!(event.kind(), EventKind::AgentStatus);
    }

    #[test]
    fn rejects_transport_and_unknown_events() {
        for name in ["heartbeat_ack", "subscribed", "reaction:new"] {
            let (status, _) = parse_domain_event(PublishRequest {
                event: name.to_string(),
                data: json!({}),
            })
            .unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn rejects_bad_payload() {
        let (status, Json(body)) = parse_domain_event(PublishRequest {
            event: "insight:new".to_string(),
            data: json!({ "id": 3 }),
        })
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("insight:new"));
    }
}
