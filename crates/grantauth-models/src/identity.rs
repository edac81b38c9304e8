//! Identity types.
//!
//! An [`Identity`] names the principal being authenticated (a wallet
//! address). A [`ContextId`] names one execution context (a tab, window or
//! process) taking part in the protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A wallet identity, compared case-insensitively.
///
/// The inner value is lower-cased on construction, so `0xABC` and `0xabc`
/// are the same identity and map to the same storage keys.
///
/// # Examples
///
/// ```
/// use grantauth_models::Identity;
///
/// let a = Identity::new("0xABCdef");
/// let b: Identity = "0xabcdef".into();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "0xabcdef");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create a new identity, normalising it to lowercase.
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_lowercase())
    }

    /// Parse an identity, rejecting empty values, values containing the
    /// storage key separator (`:`) and the reserved `active` slot name.
    pub fn parse(id: &str) -> Result<Self, ModelError> {
        let identity = Self::new(id);
        if identity.0.is_empty() {
            return Err(ModelError::InvalidIdentity {
                value: id.to_string(),
                reason: "must not be empty".into(),
            });
        }
        if identity.0.contains(':') {
            return Err(ModelError::InvalidIdentity {
                value: id.to_string(),
                reason: "must not contain ':'".into(),
            });
        }
        if identity.0 == "active" {
            return Err(ModelError::InvalidIdentity {
                value: id.to_string(),
                reason: "\"active\" is reserved".into(),
            });
        }
        Ok(identity)
    }

    /// Return the normalised inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl FromStr for Identity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// ContextId
// ---------------------------------------------------------------------------

/// Identifier of one execution context.
///
/// Generated once per context and attached to every broadcast event so a
/// context can recognise (and skip) its own echoes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh random context identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell contexts apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
