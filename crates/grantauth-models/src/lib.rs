#![deny(missing_docs)]

//! # grantauth models
//!
//! Core data types shared by every execution context taking part in the
//! wallet sign-in protocol.
//!
//! ## What lives in shared storage
//!
//! ```text
//! cred:<identity> / kind:<identity>   ← per-identity credential (authoritative)
//! cred:active     / kind:active       ← copy for whichever identity is active
//! auth:in-progress                    ← InProgressMarker (advisory, 30 s window)
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identity`] | `Identity` (case-insensitive wallet address) and `ContextId` |
//! | [`credential`] | `Credential`, `IdentityKind`, decoded `CredentialClaims` |
//! | [`marker`] | `InProgressMarker`, the shared "authenticating" record |
//! | [`event`] | `AuthEvent` broadcast between contexts |

pub mod credential;
pub mod error;
pub mod event;
pub mod identity;
pub mod marker;

// Re-export all public types at crate root for convenience.
pub use credential::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use marker::*;
