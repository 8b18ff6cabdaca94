pub mod connctx;
pub mod handler;
pub mod hub;
pub mod msg_heartbeat_handler;
pub mod msg_subscribe_handler;
pub mod msg_unsubscribe_handler;
pub mod subscriptions;

pub use handler::websocket_handler;
pub use hub::{HubStats, RealtimeHub};
pub use subscriptions::SubscriptionRegistry;
