use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{is_api_key, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingCredential,
    #[error("invalid authorization header")]
    InvalidHeader,
    #[error("JWT validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("unknown API key")]
    UnknownApiKey,
}

/// Claims carried by user session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub org_id: String,
    pub exp: usize,
}

/// Agent API keys known to this process.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyTable {
    keys: HashMap<String, Identity>,
}

impl ApiKeyTable {
    /// Parse `ahq_key=agent_id@org_id` entries separated by commas.
    /// Entries that do not follow the format are skipped with a warning.
    pub fn parse(entries: &str) -> Self {
        let mut keys = HashMap::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parsed = entry.split_once('=').and_then(|(key, owner)| {
                let (agent_id, org_id) = owner.split_once('@')?;
                (is_api_key(key) && !agent_id.is_empty() && !org_id.is_empty())
                    .then(|| (key.to_string(), Identity::agent(agent_id, org_id)))
            });
            match parsed {
                Some((key, identity)) => {
                    keys.insert(key, identity);
                }
                None => warn!("Ignoring malformed API key entry"),
            }
        }
        Self { keys }
    }

    pub fn lookup(&self, key: &str) -> Option<&Identity> {
        self.keys.get(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Resolves a credential (JWT or API key) to an [`Identity`].
#[derive(Debug, Clone)]
pub struct Authenticator {
    jwt_secret: String,
    api_keys: ApiKeyTable,
}

impl Authenticator {
    pub fn new(jwt_secret: impl Into<String>, api_keys: ApiKeyTable) -> Self {
        Self { jwt_secret: jwt_secret.into(), api_keys }
    }

    pub fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        if is_api_key(credential) {
            return self
                .api_keys
                .lookup(credential)
                .cloned()
                .ok_or(AuthError::UnknownApiKey);
        }

        let token_data = validate_jwt(credential, &self.jwt_secret)?;
        debug!("JWT token validated successfully for user: {}", token_data.claims.sub);
        Ok(Identity::user(token_data.claims.sub, token_data.claims.org_id))
    }
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, AuthError> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidHeader)?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    // 2. Try to get token from cookies
    let cookie_header = req
        .headers()
        .get(http::header::COOKIE)
        .ok_or(AuthError::MissingCredential)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)?;

    cookie::Cookie::split_parse(cookie_header)
        .flatten()
        .find(|c| c.name() == "auth_token")
        .map(|c| c.value().to_string())
        .ok_or(AuthError::MissingCredential)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<SessionClaims>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<SessionClaims>(token, &decoding_key, &validation)
}
