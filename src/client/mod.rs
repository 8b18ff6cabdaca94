//! Client side of the realtime protocol: a self-healing connection with
//! typed event listeners.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod listeners;
pub mod machine;
pub mod state;
pub mod timers;
pub mod transport;

pub use config::{ClientConfig, ClientError, Credential};
pub use connection::RealtimeClient;
pub use listeners::{EventListeners, ListenerHandle};
pub use state::ConnectionState;
