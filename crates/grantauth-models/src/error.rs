//! Error types for the `grantauth-models` crate.
//!
//! All fallible constructors and parsers in this crate return variants of
//! [`ModelError`].

/// Errors produced when constructing or validating model types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// An identity was empty or contained reserved characters.
    #[error("invalid identity \"{value}\": {reason}")]
    InvalidIdentity {
        /// The value that failed validation.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// An identity-kind tag was not one of the known kinds.
    #[error("unknown identity kind \"{value}\"")]
    UnknownIdentityKind {
        /// The value that failed to parse.
        value: String,
    },
}
