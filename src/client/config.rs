use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::state::ConnectionState;
use super::timers::MIN_PERIOD;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(30);

/// Supplies a credential at connect time; `None` means "not available yet".
pub type CredentialFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Invoked on every connection state change.
pub type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid realtime url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported url scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
}

/// The credential sent on the connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    ApiKey(String),
}

impl Credential {
    fn query_pair(&self) -> (&'static str, &str) {
        match self {
            Credential::Token(token) => ("token", token.as_str()),
            Credential::ApiKey(key) => ("apiKey", key.as_str()),
        }
    }
}

/// Settings for [`RealtimeClient`](super::RealtimeClient).
#[derive(Clone)]
pub struct ClientConfig {
    pub url: String,
    pub token: CredentialFn,
    pub api_key: CredentialFn,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    pub polling_fallback: bool,
    pub polling_interval: Duration,
    pub on_connection_change: Option<StateCallback>,
}

impl ClientConfig {
    /// Config for `url` with no credentials and default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: Arc::new(|| None),
            api_key: Arc::new(|| None),
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            polling_fallback: true,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            on_connection_change: None,
        }
    }

    pub fn with_token(mut self, token: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        self.token = Arc::new(token);
        self
    }

    pub fn with_static_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.with_token(move || Some(token.clone()))
    }

    pub fn with_api_key(mut self, api_key: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        self.api_key = Arc::new(api_key);
        self
    }

    pub fn with_static_api_key(self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.with_api_key(move || Some(api_key.clone()))
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    pub fn reconnect_delay(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_delay = base;
        self.max_reconnect_delay = max;
        self
    }

    /// Heartbeat period; zero is raised to [`MIN_PERIOD`].
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_PERIOD);
        self
    }

    pub fn polling_fallback(mut self, enabled: bool) -> Self {
        self.polling_fallback = enabled;
        self
    }

    /// Polling period; zero is raised to [`MIN_PERIOD`].
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval.max(MIN_PERIOD);
        self
    }

    pub fn on_connection_change(mut self, callback: impl Fn(ConnectionState) + Send + Sync + 'static) -> Self {
        self.on_connection_change = Some(Arc::new(callback));
        self
    }

    /// Current credential; a session token wins over an API key. Empty
    /// strings count as missing.
    pub fn credential(&self) -> Option<Credential> {
        let present = |value: Option<String>| value.filter(|v| !v.is_empty());
        present((self.token)())
            .map(Credential::Token)
            .or_else(|| present((self.api_key)()).map(Credential::ApiKey))
    }

    /// Endpoint URL carrying `credential` as a query parameter.
    pub fn endpoint_url(&self, credential: &Credential) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
        }

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != "token" && name != "apiKey")
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        let (name, value) = credential.query_pair();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(name, value);
        Ok(url)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("reconnect", &self.reconnect)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("polling_fallback", &self.polling_fallback)
            .field("polling_interval", &self.polling_interval)
            .finish_non_exhaustive()
    }
}
