use tracing::debug;
use crate::models::{ChannelRequest, ServerEvent, Unsubscribed};
use super::hub::RealtimeHub;

/// Handle an `unsubscribe` request
pub async fn handle_unsubscribe_message(request: &ChannelRequest, client_id: &str, hub: &RealtimeHub) {
    let Some(channel_id) = &request.channel_id else {
        debug!("Unsubscribe without channel from client {}", client_id);
        return;
    };

    hub.unsubscribe(client_id, channel_id).await;

    let ack = ServerEvent::Unsubscribed(Unsubscribed { channel_id: channel_id.clone() });
    hub.send_to(client_id, &ack).await;
}
