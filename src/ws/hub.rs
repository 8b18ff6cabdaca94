use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use axum::extract::ws::Message;
use tracing::{debug, info};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{ClientKind, Identity};
use crate::models::ServerEvent;
use super::connctx::ConnCtx;
use super::subscriptions::SubscriptionRegistry;

/// Counters exposed through diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub agents: usize,
    pub channels: usize,
    pub subscriptions: usize,
}

/// Open connections plus the channel subscription registry.
///
/// Constructed once at startup and shared through the router state. Locks
/// are only nested as connections-then-subscriptions (in `subscribe`): fan-out
/// snapshots the subscriber set first and then walks the connection table.
pub struct RealtimeHub {
    subscriptions: RwLock<SubscriptionRegistry>,
    connections: RwLock<HashMap<String, ConnCtx>>,
    outbound_buffer: usize,
}

impl RealtimeHub {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            subscriptions: RwLock::new(SubscriptionRegistry::new()),
            connections: RwLock::new(HashMap::new()),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Register a new connection and hand back its id and outbound queue.
    pub async fn register(&self, identity: Identity) -> (String, mpsc::Receiver<Message>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        info!(
            "WebSocket client connected: client_id={}, type={}, id={}, org={}",
            client_id, identity.kind, identity.id, identity.org_id
        );
        let ctx = ConnCtx::new(client_id.clone(), identity, tx);
        self.connections.write().await.insert(client_id.clone(), ctx);
        (client_id, rx)
    }

    /// Drop a connection and every subscription it held.
    ///
    /// The connection is removed first, so a concurrent [`subscribe`](Self::subscribe)
    /// either lands before the cleanup or sees the client gone.
    pub async fn unregister(&self, client_id: &str) {
        let removed = self.connections.write().await.remove(client_id);
        self.subscriptions.write().await.unsubscribe_all(client_id);
        if let Some(ctx) = removed {
            let duration = Utc::now() - ctx.connected_at;
            info!(
                "WebSocket client disconnected: client_id={}, id={}, connected_for={}s",
                client_id, ctx.identity.id, duration.num_seconds()
            );
        }
    }

    /// Subscribe a registered client. Returns false if the client is gone.
    pub async fn subscribe(&self, client_id: &str, channel_id: &str) -> bool {
        // Held across the registry update so unregister cannot interleave
        let connections = self.connections.read().await;
        if !connections.contains_key(client_id) {
            debug!("Client {} is gone, not subscribing to {}", client_id, channel_id);
            return false;
        }
        self.subscriptions.write().await.subscribe(channel_id, client_id);
        debug!("Client {} subscribed to {}", client_id, channel_id);
        true
    }

    pub async fn unsubscribe(&self, client_id: &str, channel_id: &str) {
        self.subscriptions.write().await.unsubscribe(channel_id, client_id);
        debug!("Client {} unsubscribed from {}", client_id, channel_id);
    }

    pub async fn channels_of(&self, client_id: &str) -> Vec<String> {
        self.subscriptions.read().await.channels_of(client_id)
    }

    /// Send one event to one connection.
    pub async fn send_to(&self, client_id: &str, event: &ServerEvent) -> bool {
        let connections = self.connections.read().await;
        match connections.get(client_id) {
            Some(ctx) => ctx.try_send_text(&event.to_text()),
            None => false,
        }
    }

    /// Push `event` to every subscriber of `channel_id` that belongs to `org_id`.
    pub async fn broadcast_to_channel(&self, org_id: &str, channel_id: &str, event: &ServerEvent) -> usize {
        let subscribers = self.subscriptions.read().await.subscribers(channel_id);
        if subscribers.is_empty() {
            debug!("No subscribers for channel {}, dropping {}", channel_id, event.kind());
            return 0;
        }

        let text = event.to_text();
        let connections = self.connections.read().await;
        let delivered = subscribers
            .iter()
            .filter_map(|client_id| connections.get(client_id))
            .filter(|ctx| ctx.identity.is_org_member(org_id))
            .filter(|ctx| ctx.try_send_text(&text))
            .count();
        debug!("Fan-out of {} to channel {}: {} client(s)", event.kind(), channel_id, delivered);
        delivered
    }

    /// Push `event` to every connection of `org_id`.
    pub async fn broadcast_to_org(&self, org_id: &str, event: &ServerEvent) -> usize {
        let text = event.to_text();
        let connections = self.connections.read().await;
        let delivered = connections
            .values()
            .filter(|ctx| ctx.identity.is_org_member(org_id))
            .filter(|ctx| ctx.try_send_text(&text))
            .count();
        debug!("Fan-out of {} to org {}: {} client(s)", event.kind(), org_id, delivered);
        delivered
    }

    pub async fn stats(&self) -> HubStats {
        let (channels, subscriptions) = {
            let registry = self.subscriptions.read().await;
            (registry.channel_count(), registry.subscription_count())
        };
        let connections = self.connections.read().await;
        let agents = connections
            .values()
            .filter(|ctx| ctx.identity.kind == ClientKind::Agent)
            .count();
        HubStats {
            connections: connections.len(),
            users: connections.len() - agents,
            agents,
            channels,
            subscriptions,
        }
    }
}
