use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Domain event to push to connected clients
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct PublishRequest {
    /// Event name, e.g. `post:new`
    pub event: String,
    /// Event payload; its shape depends on `event`
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

/// Result of a broadcast
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct PublishResponse {
    pub event: String,
    /// Number of connections the event was queued for
    pub delivered: u32,
}
