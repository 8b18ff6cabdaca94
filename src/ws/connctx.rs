use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::auth::Identity;

/// Per-connection context kept by the hub.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub client_id: String,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Message>,
}

impl ConnCtx {
    pub fn new(client_id: String, identity: Identity, sender: mpsc::Sender<Message>) -> Self {
        Self {
            client_id,
            identity,
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Queue a text frame for the writer task. Returns false when the queue
    /// is full or the connection is already gone.
    pub fn try_send_text(&self, text: &str) -> bool {
        match self.sender.try_send(Message::Text(text.to_string())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for client {}, dropping frame", self.client_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
