//! Identity provider client.
//!
//! Two endpoints: `POST /login` issues a one-time challenge for an
//! identity, `POST /authentication` exchanges the signed challenge for a
//! [`Credential`]. The request and response bodies are public so the
//! provider service can share them.

use async_trait::async_trait;
use grantauth_models::{Credential, Identity, IdentityKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;

/// The challenge/exchange half of a sign-in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain a one-time challenge for `identity`.
    async fn request_challenge(&self, identity: &Identity) -> Result<String, AuthError>;

    /// Exchange a signed challenge for a credential.
    async fn exchange(
        &self,
        identity: &Identity,
        signature: &str,
        network_hint: Option<&str>,
    ) -> Result<Credential, AuthError>;
}

// ---------------------------------------------------------------------------
// Wire bodies
// ---------------------------------------------------------------------------

/// `POST /login` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub identity: Identity,
}

/// `POST /login` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub challenge: String,
}

/// `POST /authentication` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRequest {
    pub identity: Identity,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_hint: Option<String>,
}

/// `POST /authentication` response.
///
/// A missing `identityKind` is read as [`IdentityKind::ExternallyOwned`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default = "default_kind")]
    pub identity_kind: IdentityKind,
}

fn default_kind() -> IdentityKind {
    IdentityKind::ExternallyOwned
}

impl AuthenticationResponse {
    /// The credential, or an exchange failure if the token is missing or empty.
    pub fn into_credential(self) -> Result<Credential, AuthError> {
        match self.credential {
            Some(token) if !token.is_empty() => Ok(Credential::new(token, self.identity_kind)),
            _ => Err(AuthError::CredentialExchangeFailed(
                "provider returned no credential".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// [`IdentityProvider`] over HTTP + JSON.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIdentityProvider {
    /// Talk to the provider at `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// The provider base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn request_challenge(&self, identity: &Identity) -> Result<String, AuthError> {
        let res = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest {
                identity: identity.clone(),
            })
            .send()
            .await
            .map_err(|e| AuthError::ChallengeRequestFailed(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AuthError::ChallengeRequestFailed(format!("{status}: {text}")));
        }

        let body: LoginResponse = res
            .json()
            .await
            .map_err(|e| AuthError::ChallengeRequestFailed(e.to_string()))?;
        if body.challenge.is_empty() {
            return Err(AuthError::ChallengeRequestFailed("empty challenge".into()));
        }
        debug!(identity = %identity, "challenge received");
        Ok(body.challenge)
    }

    async fn exchange(
        &self,
        identity: &Identity,
        signature: &str,
        network_hint: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let res = self
            .http
            .post(format!("{}/authentication", self.base_url))
            .json(&AuthenticationRequest {
                identity: identity.clone(),
                signature: signature.to_string(),
                network_hint: network_hint.map(str::to_string),
            })
            .send()
            .await
            .map_err(|e| AuthError::CredentialExchangeFailed(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AuthError::CredentialExchangeFailed(format!("{status}: {text}")));
        }

        let body: AuthenticationResponse = res
            .json()
            .await
            .map_err(|e| AuthError::CredentialExchangeFailed(e.to_string()))?;
        body.into_credential()
    }
}
