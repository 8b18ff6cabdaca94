use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Secret used for JWT validation when none is configured outside production.
const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// HS256 secret for user session tokens
    pub jwt_secret: Option<String>,

    /// Agent API keys: `ahq_key=agent_id@org_id`, comma separated
    pub api_keys: Option<String>,

    /// Path of the realtime endpoint
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Outbound frames queued per connection before fan-out skips it
    #[serde(default = "default_ws_outbound_buffer")]
    pub ws_outbound_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        let config = match envy::from_env::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                return Err(ConfigError::Env(e));
            }
        };
        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production() && self.jwt_secret.is_none() {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.ws_outbound_buffer == 0 {
            return Err(ConfigError::Invalid("WS_OUTBOUND_BUFFER must be at least 1".to_string()));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!("WS_PATH '{}' must start with '/'", self.ws_path)));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Secret for JWT validation, falling back to a development secret.
    pub fn jwt_secret(&self) -> String {
        match &self.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            }
        }
    }

    /// Parsed CORS origins, empty when CORS is disabled.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            jwt_secret: None,
            api_keys: None,
            ws_path: default_ws_path(),
            ws_outbound_buffer: default_ws_outbound_buffer(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    Env(#[from] envy::Error),
    #[error("JWT_SECRET is required in production")]
    MissingJwtSecret,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_ws_outbound_buffer() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_requires_jwt_secret() {
        let config = Config { environment: "production".to_string(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::MissingJwtSecret)));

        let config = Config { jwt_secret: Some("s3cret".to_string()), ..config };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn development_falls_back_to_dev_secret() {
        let config = Config::default();
        assert!(config.is_development());
        assert!(config.validate().is_ok());
        assert_eq!(config.jwt_secret(), DEV_JWT_SECRET);
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = Config {
            cors_origins: Some("http://localhost:3001, https://app.example.com,".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["http://localhost:3001".to_string(), "https://app.example.com".to_string()]
        );
        assert!(Config::default().cors_origin_list().is_empty());
    }

    #[test]
    fn ws_path_must_be_absolute() {
        let config = Config { ws_path: "ws".to_string(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
