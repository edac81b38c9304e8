//! SDK error types.
//!
//! [`AuthError`] is returned by every coordinator operation. Its variants
//! mirror the ways a sign-in can end without a credential; none of them are
//! fatal, and a later call may always retry. Backend failures surface as
//! [`StorageError`] and [`BusError`], decoding failures as
//! [`ValidationError`].

use grantauth_models::Identity;

/// Outcome of a failed or suppressed authentication attempt.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The user never connected a signer.
    #[error("wallet connection was abandoned")]
    ConnectionAbandoned,

    /// The identity provider did not issue a challenge.
    #[error("challenge request failed: {0}")]
    ChallengeRequestFailed(String),

    /// The user declined to sign, or the signer failed.
    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    /// The identity provider refused the signature or returned no token.
    #[error("credential exchange failed: {0}")]
    CredentialExchangeFailed(String),

    /// Waited the full window for another context without a result.
    #[error("authentication timed out waiting for another window")]
    PeerTimeout,

    /// Another context reported that its sign-in failed.
    #[error("sign-in failed in another window")]
    PeerFailed,

    /// An attempt is already running in this context. Not a user-facing
    /// failure.
    #[error("authentication already in progress for {0}")]
    DuplicateSuppressed(Identity),

    /// This context signed out while the attempt was running; nothing it
    /// obtained was kept.
    #[error("sign-in for {0} cancelled by sign-out")]
    SignedOut(Identity),

    /// The wallet could not be loaded or used.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Shared storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Whether the error should be surfaced to the user. Suppressed
    /// duplicates and attempts the user cancelled by signing out are not.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::DuplicateSuppressed(_) | Self::SignedOut(_))
    }
}

/// Failure of a [`SharedStorage`](crate::SharedStorage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// No usable location for file-backed storage.
    #[error("storage configuration error: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a [`BroadcastBus`](crate::BroadcastBus).
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// NATS transport error.
    #[error("NATS error: {0}")]
    Nats(String),

    /// JSON (de)serialisation error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<async_nats::ConnectError> for BusError {
    fn from(e: async_nats::ConnectError) -> Self {
        BusError::Nats(e.to_string())
    }
}

impl From<async_nats::PublishError> for BusError {
    fn from(e: async_nats::PublishError) -> Self {
        BusError::Nats(e.to_string())
    }
}

impl From<async_nats::SubscribeError> for BusError {
    fn from(e: async_nats::SubscribeError) -> Self {
        BusError::Nats(e.to_string())
    }
}

/// Why a credential token could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The token is not three dot-separated segments.
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// The body segment is not valid base64url.
    #[error("invalid base64 in token body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The body is not a JSON claims object.
    #[error("invalid claims: {0}")]
    Claims(#[from] serde_json::Error),
}
