use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{api_error, ApiError};
use axum::http::StatusCode;

/// Prefix that marks a credential as an agent API key rather than a JWT.
pub const API_KEY_PREFIX: &str = "ahq_";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    User,
    Agent,
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKind::User => f.write_str("user"),
            ClientKind::Agent => f.write_str("agent"),
        }
    }
}

/// Who is behind a connection or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub kind: ClientKind,
    /// User id for JWTs, agent id for API keys.
    pub id: String,
    pub org_id: String,
}

impl Identity {
    pub fn user(id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self { kind: ClientKind::User, id: id.into(), org_id: org_id.into() }
    }

    pub fn agent(id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self { kind: ClientKind::Agent, id: id.into(), org_id: org_id.into() }
    }

    pub fn is_org_member(&self, org_id: &str) -> bool {
        self.org_id == org_id
    }
}

pub fn is_api_key(credential: &str) -> bool {
    credential.starts_with(API_KEY_PREFIX)
}

pub fn ensure_org_member(identity: &Identity, org_id: &str) -> Result<(), ApiError> {
    if identity.is_org_member(org_id) {
        return Ok(());
    }
    Err(api_error(
        StatusCode::FORBIDDEN,
        "Caller is not a member of the organization",
    ))
}
