//! Session credential types.
//!
//! A [`Credential`] is the opaque signed token issued by the identity
//! provider after a successful sign-in, tagged with the [`IdentityKind`] the
//! provider reported. The token body carries [`CredentialClaims`], of which
//! only `exp` matters to the coordinator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::identity::Identity;

// ---------------------------------------------------------------------------
// IdentityKind
// ---------------------------------------------------------------------------

/// The kind of wallet that obtained a credential.
///
/// Stored next to the token under `kind:<identity>`.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum IdentityKind {
    /// A key-controlled wallet.
    #[serde(rename = "eoa")]
    #[strum(serialize = "eoa")]
    ExternallyOwned,
    /// A contract (smart) wallet.
    #[serde(rename = "contract")]
    #[strum(serialize = "contract")]
    Contract,
}

impl IdentityKind {
    /// Parse a stored `kind:` tag.
    pub fn parse_tag(tag: &str) -> Result<Self, ModelError> {
        tag.parse().map_err(|_| ModelError::UnknownIdentityKind {
            value: tag.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A signed session credential together with its identity-kind tag.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    /// The opaque signed token (a JWT).
    pub token: String,
    /// The identity kind reported by the provider.
    pub kind: IdentityKind,
}

impl Credential {
    /// Build a credential from a token and its kind.
    pub fn new(token: impl Into<String>, kind: IdentityKind) -> Self {
        Self {
            token: token.into(),
            kind,
        }
    }
}

// Tokens are bearer secrets; keep them out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.token.chars().take(8).collect();
        f.debug_struct("Credential")
            .field("token", &format_args!("{prefix}…"))
            .field("kind", &self.kind)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CredentialClaims
// ---------------------------------------------------------------------------

/// The decoded body of a credential token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialClaims {
    /// Subject: the identity the token was issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<Identity>,
    /// Expiry, in unix seconds.
    pub exp: i64,
    /// Issued-at, in unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Identity kind, when the issuer embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<IdentityKind>,
}

impl CredentialClaims {
    /// Whether the token has expired at `now`.
    ///
    /// A token whose `exp` equals the current second is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn identity_kind_display_and_parse() {
        assert_eq!(IdentityKind::ExternallyOwned.to_string(), "eoa");
        assert_eq!(IdentityKind::Contract.to_string(), "contract");
        assert_eq!(
            IdentityKind::from_str("contract").unwrap(),
            IdentityKind::Contract
        );
        assert!(IdentityKind::from_str("multisig").is_err());
    }

    #[test]
    fn parse_tag_reports_unknown_kind() {
        assert_eq!(
            IdentityKind::parse_tag("eoa").unwrap(),
            IdentityKind::ExternallyOwned
        );
        assert_eq!(
            IdentityKind::parse_tag("multisig").unwrap_err(),
            ModelError::UnknownIdentityKind {
                value: "multisig".into()
            }
        );
    }

    #[test]
    fn identity_kind_serde_matches_display() {
        for kind in <IdentityKind as strum::IntoEnumIterator>::iter() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn credential_debug_hides_token() {
        let cred = Credential::new("eyJhbGciOiJIUzI1NiJ9.secret.sig", IdentityKind::Contract);
        let debug = format!("{cred:?}");
        assert!(debug.contains("eyJhbGci"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn claims_expiry_boundary() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let at_now = CredentialClaims {
            sub: None,
            exp: 1_700_000_000,
            iat: None,
            kind: None,
        };
        assert!(at_now.is_expired_at(now));

        let later = CredentialClaims {
            exp: 1_700_000_001,
            ..at_now
        };
        assert!(!later.is_expired_at(now));
    }

    #[test]
    fn claims_tolerate_missing_optional_fields() {
        let claims: CredentialClaims = serde_json::from_str(r#"{"exp": 42}"#).unwrap();
        assert_eq!(claims.exp, 42);
        assert!(claims.sub.is_none());
    }
}
