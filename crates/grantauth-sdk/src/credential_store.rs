//! Address-scoped credential cache.
//!
//! Credentials live under `cred:<identity>` / `kind:<identity>`, with a
//! convenience copy under the fixed active slot for whichever identity this
//! context currently considers active. The per-identity slot is
//! authoritative; the two slots are written one after the other with no
//! transaction, so a crash between them leaves the active copy briefly
//! stale.

use std::sync::{Arc, PoisonError, RwLock};

use grantauth_models::{Credential, Identity, IdentityKind};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::keys::StorageKeys;
use crate::storage::SharedStorage;

/// Credential slots on top of a [`SharedStorage`] backend.
///
/// Clones share the backend and the active-identity cell.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SharedStorage>,
    active: Arc<RwLock<Option<Identity>>>,
}

impl CredentialStore {
    /// Wrap a storage backend. No identity is active initially.
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        Self {
            storage,
            active: Arc::new(RwLock::new(None)),
        }
    }

    // ------------------------------------------------------------------
    // Active identity (per context, in memory)
    // ------------------------------------------------------------------

    /// Record which identity is active in this context.
    pub fn set_active_identity(&self, identity: Option<Identity>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }

    /// The identity active in this context, if any.
    pub fn active_identity(&self) -> Option<Identity> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `identity` is the active identity.
    pub fn is_active(&self, identity: &Identity) -> bool {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            == Some(identity)
    }

    // ------------------------------------------------------------------
    // Per-identity slots
    // ------------------------------------------------------------------

    /// Read the credential stored for `identity`.
    pub async fn get(&self, identity: &Identity) -> Result<Option<Credential>, StorageError> {
        self.read_pair(&StorageKeys::credential(identity), &StorageKeys::kind(identity))
            .await
    }

    /// Store a credential for `identity`, mirroring it into the active slot
    /// when `identity` is active.
    pub async fn put(&self, identity: &Identity, credential: &Credential) -> Result<(), StorageError> {
        self.write_pair(
            &StorageKeys::credential(identity),
            &StorageKeys::kind(identity),
            credential,
        )
        .await?;
        if self.is_active(identity) {
            self.put_active(credential).await?;
        }
        debug!(identity = %identity, kind = %credential.kind, "credential stored");
        Ok(())
    }

    /// Remove the credential stored for `identity`.
    pub async fn clear(&self, identity: &Identity) -> Result<(), StorageError> {
        self.storage.remove(&StorageKeys::credential(identity)).await?;
        self.storage.remove(&StorageKeys::kind(identity)).await
    }

    // ------------------------------------------------------------------
    // Active slot
    // ------------------------------------------------------------------

    /// Read the active-slot copy.
    pub async fn get_active(&self) -> Result<Option<Credential>, StorageError> {
        self.read_pair(&StorageKeys::active_credential(), &StorageKeys::active_kind())
            .await
    }

    /// Overwrite the active-slot copy.
    pub async fn put_active(&self, credential: &Credential) -> Result<(), StorageError> {
        self.write_pair(
            &StorageKeys::active_credential(),
            &StorageKeys::active_kind(),
            credential,
        )
        .await
    }

    /// Remove the active-slot copy.
    pub async fn clear_active(&self) -> Result<(), StorageError> {
        self.storage.remove(&StorageKeys::active_credential()).await?;
        self.storage.remove(&StorageKeys::active_kind()).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn read_pair(&self, cred_key: &str, kind_key: &str) -> Result<Option<Credential>, StorageError> {
        let Some(token) = self.storage.get(cred_key).await? else {
            return Ok(None);
        };
        let Some(tag) = self.storage.get(kind_key).await? else {
            debug!(key = %cred_key, "credential without kind tag, treating as absent");
            return Ok(None);
        };
        match IdentityKind::parse_tag(&tag) {
            Ok(kind) => Ok(Some(Credential { token, kind })),
            Err(e) => {
                warn!(key = %kind_key, error = %e, "ignoring credential with unknown kind");
                Ok(None)
            }
        }
    }

    async fn write_pair(&self, cred_key: &str, kind_key: &str, credential: &Credential) -> Result<(), StorageError> {
        self.storage.put(cred_key, &credential.token).await?;
        self.storage.put(kind_key, &credential.kind.to_string()).await
    }
}
