use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::services::{ApiKeyTable, Authenticator};
use crate::ws::RealtimeHub;

/// Shared router state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    pub auth: Arc<Authenticator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let api_keys = config
            .api_keys
            .as_deref()
            .map(ApiKeyTable::parse)
            .unwrap_or_default();
        if api_keys.is_empty() {
            warn!("No agent API keys configured, agents cannot connect");
        } else {
            info!("Loaded {} agent API key(s)", api_keys.len());
        }

        let auth = Authenticator::new(config.jwt_secret(), api_keys);
        Self::with_parts(config, auth)
    }

    /// Assemble state from an explicit authenticator.
    pub fn with_parts(config: Config, auth: Authenticator) -> Self {
        Self {
            hub: Arc::new(RealtimeHub::new(config.ws_outbound_buffer)),
            auth: Arc::new(auth),
            config: Arc::new(config),
        }
    }
}
