use std::borrow::Cow;
use axum::{
    extract::{Query, State, ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::models::{ClientMessage, DecodeError};
use crate::state::AppState;
use super::hub::RealtimeHub;
use super::msg_heartbeat_handler::handle_heartbeat_message;
use super::msg_subscribe_handler::handle_subscribe_message;
use super::msg_unsubscribe_handler::handle_unsubscribe_message;

/// Close code sent when the connection cannot be authenticated.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// Credentials accepted on the upgrade URL.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

impl WsAuthQuery {
    /// Session token wins over API key; empty values count as absent.
    pub fn credential(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.api_key.filter(|k| !k.is_empty()))
    }
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, query.credential(), state))
}

/// Handle WebSocket connection
async fn handle_socket(mut socket: WebSocket, credential: Option<String>, state: AppState) {
    // Authenticate before registering anything
    let identity = match credential {
        None => {
            close_with(&mut socket, CLOSE_UNAUTHORIZED, "Missing authentication token").await;
            return;
        }
        Some(credential) => match state.auth.authenticate(&credential) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("WebSocket authentication failed: {}", e);
                close_with(&mut socket, CLOSE_UNAUTHORIZED, "Invalid authentication").await;
                return;
            }
        },
    };

    let (client_id, mut outbound) = state.hub.register(identity).await;

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Writer: drain the outbound queue into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Reader: dispatch client requests
    let hub = state.hub.clone();
    let reader_client_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => handle_text_frame(&text, &reader_client_id, &hub).await,
                Ok(Message::Close(_)) => break,
                // Pings are answered by axum; binary frames are not part of the protocol
                Ok(_) => continue,
                Err(e) => {
                    error!("WebSocket error for client {}: {}", reader_client_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            // A frame mid-dispatch must finish before cleanup
            let _ = recv_task.await;
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            let _ = send_task.await;
        }
    };

    state.hub.unregister(&client_id).await;
    info!("WebSocket connection terminated: {}", client_id);
}

/// Decode one text frame and route it. Bad frames never end the connection.
pub async fn handle_text_frame(text: &str, client_id: &str, hub: &RealtimeHub) {
    match ClientMessage::decode(text) {
        Ok(ClientMessage::Subscribe(request)) => {
            handle_subscribe_message(&request, client_id, hub).await
        }
        Ok(ClientMessage::Unsubscribe(request)) => {
            handle_unsubscribe_message(&request, client_id, hub).await
        }
        Ok(ClientMessage::Heartbeat(heartbeat)) => {
            handle_heartbeat_message(&heartbeat, client_id, hub).await
        }
        Err(DecodeError::UnknownEvent(event)) => {
            warn!("Unknown WebSocket event '{}' from client {}", event, client_id);
        }
        Err(e) => {
            debug!("Ignoring frame from client {}: {}", client_id, e);
        }
    }
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame { code, reason: Cow::Borrowed(reason) };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame: {}", e);
    }
}
