//! Identity provider configuration.
//!
//! Built from environment variables at startup and shared with every
//! handler through [`axum::extract::State`].

use std::collections::HashSet;
use std::time::Duration;

use grantauth_models::{Identity, IdentityKind};

/// Global configuration shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port to listen on (default `3002`).
    pub listen_port: u16,
    /// HMAC secret for issued session tokens.
    pub token_secret: String,
    /// Lifetime of issued session tokens.
    pub token_ttl: Duration,
    /// How long an issued challenge may be answered.
    pub challenge_ttl: Duration,
    /// Identities reported as contract wallets; everything else is `eoa`.
    pub contract_identities: HashSet<Identity>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_port: 3002,
            token_secret: "grantauth-dev-secret".to_string(),
            token_ttl: Duration::from_secs(3600),
            challenge_ttl: Duration::from_secs(300),
            contract_identities: HashSet::new(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables.
    ///
    /// | Variable                  | Default                | Description                          |
    /// |---------------------------|------------------------|--------------------------------------|
    /// | `IDP_PORT`                | `3002`                 | HTTP listen port                     |
    /// | `IDP_TOKEN_SECRET`        | `grantauth-dev-secret` | HS256 signing secret                 |
    /// | `IDP_TOKEN_TTL_SECS`      | `3600`                 | session token lifetime (seconds)     |
    /// | `IDP_CONTRACT_IDENTITIES` | empty                  | comma-separated contract identities  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let listen_port = std::env::var("IDP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.listen_port);
        let token_secret = std::env::var("IDP_TOKEN_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.token_secret);
        let token_ttl = std::env::var("IDP_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.token_ttl, Duration::from_secs);
        let contract_identities = std::env::var("IDP_CONTRACT_IDENTITIES")
            .map(|v| parse_identity_list(&v))
            .unwrap_or_default();

        Self {
            listen_port,
            token_secret,
            token_ttl,
            challenge_ttl: defaults.challenge_ttl,
            contract_identities,
        }
    }

    /// The wallet kind reported for `identity`.
    pub fn kind_for(&self, identity: &Identity) -> IdentityKind {
        if self.contract_identities.contains(identity) {
            IdentityKind::Contract
        } else {
            IdentityKind::ExternallyOwned
        }
    }
}

/// Parse a comma-separated identity list, skipping invalid entries.
fn parse_identity_list(raw: &str) -> HashSet<Identity> {
    raw.split(',')
        .filter_map(|s| Identity::parse(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.listen_port, 3002);
        assert_eq!(cfg.token_ttl, Duration::from_secs(3600));
        assert!(cfg.contract_identities.is_empty());
    }

    #[test]
    fn identity_list_is_normalised() {
        let set = parse_identity_list(" 0xABC, ,0xdef,active");
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Identity::new("0xabc")));
        assert!(set.contains(&Identity::new("0xdef")));
    }

    #[test]
    fn kind_lookup() {
        let cfg = AppConfig {
            contract_identities: parse_identity_list("0xabc"),
            ..AppConfig::default()
        };
        assert_eq!(cfg.kind_for(&Identity::new("0xABC")), IdentityKind::Contract);
        assert_eq!(cfg.kind_for(&Identity::new("0xdef")), IdentityKind::ExternallyOwned);
    }
}
