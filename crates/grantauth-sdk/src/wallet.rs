//! Wallet abstractions.
//!
//! The coordinator needs two things from a wallet: a way to get the user
//! connected ([`WalletConnection`]) and a way to sign the provider's
//! challenge ([`SigningAuthority`]). [`NKeyWallet`] is a key-controlled
//! implementation on Ed25519 user nkeys.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use grantauth_models::Identity;
use nkeys::{KeyPair, KeyPairType};
use tracing::debug;

use crate::error::AuthError;

/// Connection state of the user's wallet.
#[async_trait]
pub trait WalletConnection: Send + Sync {
    /// Whether a signer is currently connected.
    fn is_connected(&self) -> bool;

    /// Ask the user to connect. Resolves `false` if they dismiss the prompt.
    async fn open_connection_prompt(&self) -> bool;
}

/// Signs challenge messages on behalf of an identity.
#[async_trait]
pub trait SigningAuthority: Send + Sync {
    /// Sign `message` as `identity`. A user refusal is
    /// [`AuthError::SignatureRejected`].
    async fn sign(&self, identity: &Identity, message: &str) -> Result<String, AuthError>;
}

/// Wallet holding a single Ed25519 user nkey.
///
/// The identity is the lowercased public key. Signatures are the raw
/// Ed25519 bytes in unpadded base64url.
pub struct NKeyWallet {
    kp: KeyPair,
    identity: Identity,
    connected: AtomicBool,
}

impl NKeyWallet {
    /// Generate a fresh keypair. The wallet starts disconnected.
    pub fn generate() -> Self {
        Self::from_keypair(KeyPair::new(KeyPairType::User))
    }

    /// Load a wallet from an nkey seed (`SU...`).
    pub fn from_seed(seed: &str) -> Result<Self, AuthError> {
        let kp = KeyPair::from_seed(seed).map_err(|e| AuthError::Wallet(e.to_string()))?;
        Ok(Self::from_keypair(kp))
    }

    fn from_keypair(kp: KeyPair) -> Self {
        let identity = Identity::new(&kp.public_key());
        Self {
            kp,
            identity,
            connected: AtomicBool::new(false),
        }
    }

    /// The identity this wallet signs for.
    pub fn identity(&self) -> Identity {
        self.identity.clone()
    }

    /// The seed, for persisting the wallet.
    pub fn seed(&self) -> Result<String, AuthError> {
        self.kp.seed().map_err(|e| AuthError::Wallet(e.to_string()))
    }

    /// Drop the connection, as if the user disconnected the signer.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for NKeyWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NKeyWallet")
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletConnection for NKeyWallet {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_connection_prompt(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        debug!(identity = %self.identity, "nkey wallet connected");
        true
    }
}

#[async_trait]
impl SigningAuthority for NKeyWallet {
    async fn sign(&self, identity: &Identity, message: &str) -> Result<String, AuthError> {
        if !self.is_connected() {
            return Err(AuthError::SignatureRejected("wallet is not connected".into()));
        }
        if *identity != self.identity {
            return Err(AuthError::SignatureRejected(format!(
                "wallet does not hold a key for {identity}"
            )));
        }
        let sig = self
            .kp
            .sign(message.as_bytes())
            .map_err(|e| AuthError::SignatureRejected(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(sig))
    }
}

/// Check a signature produced by [`NKeyWallet`].
///
/// `identity` is the (lowercased) public key. Any decoding failure counts
/// as an invalid signature.
pub fn verify_nkey_signature(identity: &Identity, message: &str, signature: &str) -> bool {
    let Ok(kp) = KeyPair::from_public_key(&identity.as_str().to_uppercase()) else {
        return false;
    };
    let Ok(sig) = URL_SAFE_NO_PAD.decode(signature.trim_end_matches('=')) else {
        return false;
    };
    kp.verify(message.as_bytes(), &sig).is_ok()
}
