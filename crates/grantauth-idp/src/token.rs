//! Session token issuance.
//!
//! Tokens are HS256 JWTs. The coordinator only ever reads `exp`; `sub`
//! and `kind` let a backend tell who the session belongs to.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use grantauth_models::{Identity, IdentityKind};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdpError;

/// Claims carried by an issued session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Identity,
    pub kind: IdentityKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Sign a session token for `identity` valid for `ttl` from `now`.
pub fn issue_token(
    secret: &str,
    identity: &Identity,
    kind: IdentityKind,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, IdpError> {
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::hours(1));
    let claims = SessionClaims {
        sub: identity.clone(),
        kind,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
        jti: Uuid::new_v4().to_string(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}
