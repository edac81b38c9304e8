//! Scripted collaborators for simulations and tests.
//!
//! [`ScriptedWallet`] and [`ScriptedProvider`] stand in for the user's
//! wallet and the identity provider so several coordinators can be raced
//! against each other in one process. Both count how often they are used,
//! which is what the race assertions look at.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use grantauth_models::{Credential, Identity, IdentityKind};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::provider::IdentityProvider;
use crate::wallet::{SigningAuthority, WalletConnection};

/// Build an unsigned JWT-shaped token for `identity` expiring at `exp`.
///
/// Every call gets a fresh `jti`, so two tokens never compare equal.
pub fn mint_token(identity: &Identity, exp: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let body = serde_json::json!({
        "sub": identity.as_str(),
        "exp": exp.timestamp(),
        "jti": Uuid::new_v4().to_string(),
    });
    let body = URL_SAFE_NO_PAD.encode(body.to_string());
    format!("{header}.{body}.unsigned")
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignScript {
    Sign,
    Reject,
    Panic,
}

/// A wallet whose user behaves according to a script.
#[derive(Debug)]
pub struct ScriptedWallet {
    connected: AtomicBool,
    accept_prompt: bool,
    on_sign: SignScript,
    sign_delay: Duration,
    prompts: AtomicUsize,
    signs: AtomicUsize,
}

impl ScriptedWallet {
    fn scripted(connected: bool, accept_prompt: bool, on_sign: SignScript) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            accept_prompt,
            on_sign,
            sign_delay: Duration::ZERO,
            prompts: AtomicUsize::new(0),
            signs: AtomicUsize::new(0),
        }
    }

    /// Already connected; signs everything.
    pub fn connected() -> Self {
        Self::scripted(true, true, SignScript::Sign)
    }

    /// Not connected yet; the user accepts the prompt.
    pub fn disconnected() -> Self {
        Self::scripted(false, true, SignScript::Sign)
    }

    /// Not connected; the user dismisses the prompt.
    pub fn abandoning() -> Self {
        Self::scripted(false, false, SignScript::Sign)
    }

    /// Connected, but the user declines to sign.
    pub fn rejecting() -> Self {
        Self::scripted(true, true, SignScript::Reject)
    }

    /// Connected, but the signer crashes mid-request.
    pub fn panicking() -> Self {
        Self::scripted(true, true, SignScript::Panic)
    }

    /// Take `delay` to produce each signature (the user reading the prompt).
    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = delay;
        self
    }

    /// Signature prompts shown so far, including rejected ones.
    pub fn sign_count(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }

    /// Connection prompts shown so far.
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletConnection for ScriptedWallet {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_connection_prompt(&self) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.accept_prompt {
            self.connected.store(true, Ordering::SeqCst);
        }
        self.accept_prompt
    }
}

#[async_trait]
impl SigningAuthority for ScriptedWallet {
    async fn sign(&self, identity: &Identity, message: &str) -> Result<String, AuthError> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        if !self.sign_delay.is_zero() {
            tokio::time::sleep(self.sign_delay).await;
        }
        match self.on_sign {
            SignScript::Sign => Ok(format!("sig:{identity}:{message}")),
            SignScript::Reject => Err(AuthError::SignatureRejected("user declined".into())),
            SignScript::Panic => panic!("signer crashed while signing for {identity}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

/// An identity provider that mints tokens locally.
#[derive(Debug)]
pub struct ScriptedProvider {
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    kind: IdentityKind,
    latency: Duration,
    fixed_token: Option<String>,
    fail_challenge: bool,
    fail_exchange: bool,
    challenges: AtomicUsize,
    exchanges: AtomicUsize,
    hints: Mutex<Vec<Option<String>>>,
}

impl ScriptedProvider {
    /// Issue one-hour externally-owned credentials stamped by `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ttl: TimeDelta::hours(1),
            kind: IdentityKind::ExternallyOwned,
            latency: Duration::ZERO,
            fixed_token: None,
            fail_challenge: false,
            fail_exchange: false,
            challenges: AtomicUsize::new(0),
            exchanges: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_kind(mut self, kind: IdentityKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sleep `latency` on each endpoint call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Always return `token` instead of minting one.
    pub fn with_fixed_token(mut self, token: impl Into<String>) -> Self {
        self.fixed_token = Some(token.into());
        self
    }

    /// Refuse to issue challenges.
    pub fn failing_challenge(mut self) -> Self {
        self.fail_challenge = true;
        self
    }

    /// Return no credential from the exchange.
    pub fn failing_exchange(mut self) -> Self {
        self.fail_exchange = true;
        self
    }

    pub fn challenge_count(&self) -> usize {
        self.challenges.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Network hints received by the exchange, in call order.
    pub fn network_hints(&self) -> Vec<Option<String>> {
        self.hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn request_challenge(&self, identity: &Identity) -> Result<String, AuthError> {
        self.delay().await;
        let n = self.challenges.fetch_add(1, Ordering::SeqCst);
        if self.fail_challenge {
            return Err(AuthError::ChallengeRequestFailed("provider unavailable".into()));
        }
        Ok(format!("sign-in {identity} #{n}"))
    }

    async fn exchange(
        &self,
        identity: &Identity,
        _signature: &str,
        network_hint: Option<&str>,
    ) -> Result<Credential, AuthError> {
        self.delay().await;
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(network_hint.map(str::to_string));
        if self.fail_exchange {
            return Err(AuthError::CredentialExchangeFailed(
                "provider returned no credential".into(),
            ));
        }
        let token = match &self.fixed_token {
            Some(token) => token.clone(),
            None => mint_token(identity, self.clock.now() + self.ttl),
        };
        Ok(Credential::new(token, self.kind))
    }
}
