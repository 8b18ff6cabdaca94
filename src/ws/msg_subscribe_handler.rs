use tracing::debug;
use crate::models::{ChannelRequest, ServerEvent, Subscribed};
use super::hub::RealtimeHub;

/// Handle a `subscribe` request
pub async fn handle_subscribe_message(request: &ChannelRequest, client_id: &str, hub: &RealtimeHub) {
    let Some(channel_id) = &request.channel_id else {
        debug!("Subscribe without channel from client {}", client_id);
        return;
    };

    if !hub.subscribe(client_id, channel_id).await {
        return;
    }

    // Confirm so the client knows the subscription is live
    let ack = ServerEvent::Subscribed(Subscribed { channel_id: channel_id.clone() });
    hub.send_to(client_id, &ack).await;
}
