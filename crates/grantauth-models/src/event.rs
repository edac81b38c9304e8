//! Broadcast events exchanged between execution contexts.

use serde::{Deserialize, Serialize};

use crate::identity::{ContextId, Identity};

/// What happened to a sign-in attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEventKind {
    /// A context became the driver for `identity`.
    Started {
        /// The identity being authenticated.
        identity: Identity,
    },
    /// The driver for `identity` finished.
    Completed {
        /// The identity that was being authenticated.
        identity: Identity,
        /// Whether a credential was obtained and stored.
        success: bool,
    },
}

/// An event published on the broadcast bus.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    /// The context that published the event.
    pub origin: ContextId,
    /// The event payload.
    #[serde(flatten)]
    pub kind: AuthEventKind,
}

impl AuthEvent {
    /// A `started` event for `identity`.
    pub fn started(origin: ContextId, identity: Identity) -> Self {
        Self {
            origin,
            kind: AuthEventKind::Started { identity },
        }
    }

    /// A `completed` event for `identity`.
    pub fn completed(origin: ContextId, identity: Identity, success: bool) -> Self {
        Self {
            origin,
            kind: AuthEventKind::Completed { identity, success },
        }
    }

    /// The identity the event refers to.
    pub fn identity(&self) -> &Identity {
        match &self.kind {
            AuthEventKind::Started { identity } | AuthEventKind::Completed { identity, .. } => {
                identity
            }
        }
    }
}
