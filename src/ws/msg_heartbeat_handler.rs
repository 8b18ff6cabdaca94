use chrono::Utc;
use tracing::{debug, error};
use crate::models::{HeartbeatAck, HeartbeatMessage, ServerEvent};
use super::hub::RealtimeHub;

/// Handle a `heartbeat` - reply with the server clock.
pub async fn handle_heartbeat_message(heartbeat: &HeartbeatMessage, client_id: &str, hub: &RealtimeHub) {
    debug!("Heartbeat from client {} (client time {:?})", client_id, heartbeat.timestamp);

    let ack = ServerEvent::HeartbeatAck(HeartbeatAck { timestamp: Utc::now().to_rfc3339() });
    if !hub.send_to(client_id, &ack).await {
        error!("Failed to send heartbeat_ack to client {}", client_id);
    }
}
