//! Canonical storage keys and bus subjects.
//!
//! Every key written to shared storage and every NATS name used by the
//! coordinator is built through [`StorageKeys`], so all contexts agree on a
//! single layout.
//!
//! # Storage layout
//!
//! ```text
//! cred:{identity}      ← credential token for one identity (authoritative)
//! kind:{identity}      ← identity-kind tag for that token
//! cred:active          ← copy of the active identity's token
//! kind:active          ← copy of the active identity's kind
//! auth:in-progress     ← InProgressMarker (JSON)
//! ```
//!
//! # NATS names
//!
//! ```text
//! grantauth.v1.{namespace}.auth.events   ← broadcast subject
//! grantauth-v1-{namespace}-session       ← JetStream KV bucket
//! ```

use grantauth_models::Identity;

/// Current layout version.
const VERSION: &str = "v1";

/// Suffix of the fixed "active" slot.
const ACTIVE: &str = "active";

/// Central authority for storage keys, bucket names and subjects.
///
/// # Examples
///
/// ```
/// use grantauth_models::Identity;
/// use grantauth_sdk::StorageKeys;
///
/// let id = Identity::new("0xABC");
/// assert_eq!(StorageKeys::credential(&id), "cred:0xabc");
/// assert_eq!(StorageKeys::active_credential(), "cred:active");
/// assert_eq!(StorageKeys::in_progress(), "auth:in-progress");
/// ```
pub struct StorageKeys;

impl StorageKeys {
    // ------------------------------------------------------------------
    // Credential slots
    // ------------------------------------------------------------------

    /// Key of the credential token for `identity`.
    pub fn credential(identity: &Identity) -> String {
        format!("cred:{identity}")
    }

    /// Key of the identity-kind tag for `identity`.
    pub fn kind(identity: &Identity) -> String {
        format!("kind:{identity}")
    }

    /// Key of the active credential token.
    pub fn active_credential() -> String {
        format!("cred:{ACTIVE}")
    }

    /// Key of the active identity-kind tag.
    pub fn active_kind() -> String {
        format!("kind:{ACTIVE}")
    }

    // ------------------------------------------------------------------
    // Marker
    // ------------------------------------------------------------------

    /// Key of the single in-progress marker.
    pub fn in_progress() -> String {
        "auth:in-progress".to_string()
    }

    // ------------------------------------------------------------------
    // NATS
    // ------------------------------------------------------------------

    /// Subject carrying broadcast auth events.
    pub fn events_subject(namespace: &str) -> String {
        format!("grantauth.{VERSION}.{namespace}.auth.events")
    }

    /// JetStream KV bucket holding the shared storage.
    pub fn kv_bucket(namespace: &str) -> String {
        format!("grantauth-{VERSION}-{namespace}-session")
    }

    /// Map a storage key onto the JetStream KV key alphabet.
    ///
    /// KV keys may not contain `:`, so the separator becomes `.`.
    pub fn kv_key(key: &str) -> String {
        key.replace(':', ".")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    #[test]
    fn per_identity_keys_are_lowercase() {
        assert_eq!(StorageKeys::credential(&id("0xDEF")), "cred:0xdef");
        assert_eq!(StorageKeys::kind(&id("0xDEF")), "kind:0xdef");
    }

    #[test]
    fn active_keys() {
        assert_eq!(StorageKeys::active_credential(), "cred:active");
        assert_eq!(StorageKeys::active_kind(), "kind:active");
    }

    #[test]
    fn nats_names_vary_by_namespace() {
        assert_eq!(
            StorageKeys::events_subject("grants"),
            "grantauth.v1.grants.auth.events"
        );
        assert_eq!(StorageKeys::kv_bucket("grants"), "grantauth-v1-grants-session");
    }

    #[test]
    fn kv_key_replaces_separator() {
        assert_eq!(StorageKeys::kv_key("auth:in-progress"), "auth.in-progress");
        assert_eq!(StorageKeys::kv_key("cred:0xabc"), "cred.0xabc");
    }
}
