//! The shared in-progress marker.
//!
//! One storage slot records `{identity, started_at, tag}` while some context
//! drives a sign-in. This is an advisory hint, not a lock: two contexts can
//! both read an empty slot and both claim it, in which case the last writer
//! wins and both proceed. The protocol accepts the duplicate round trip that
//! follows; nothing here tries to hide it.

use std::sync::Arc;
use std::time::Duration;

use grantauth_models::{Identity, InProgressMarker};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StorageError;
use crate::keys::StorageKeys;
use crate::storage::SharedStorage;

/// Access to the in-progress marker slot.
#[derive(Clone)]
pub struct MarkerSlot {
    storage: Arc<dyn SharedStorage>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl MarkerSlot {
    /// Bind to the marker slot of `storage`.
    pub fn new(storage: Arc<dyn SharedStorage>, clock: Arc<dyn Clock>, stale_after: Duration) -> Self {
        Self {
            storage,
            clock,
            stale_after,
        }
    }

    /// Read the raw marker, whatever its age.
    ///
    /// An unparsable marker reads as absent.
    pub async fn read(&self) -> Result<Option<InProgressMarker>, StorageError> {
        let Some(raw) = self.storage.get(&StorageKeys::in_progress()).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!(error = %e, "unreadable in-progress marker");
                Ok(None)
            }
        }
    }

    /// Whether some context holds a fresh claim for `identity`.
    ///
    /// A claim for a different identity does not count. A stale or
    /// unreadable marker is removed and reported as unclaimed.
    pub async fn is_claimed_by_other(&self, identity: &Identity) -> Result<bool, StorageError> {
        let Some(raw) = self.storage.get(&StorageKeys::in_progress()).await? else {
            return Ok(false);
        };
        let marker: InProgressMarker = match serde_json::from_str(&raw) {
            Ok(marker) => marker,
            Err(e) => {
                warn!(error = %e, "removing unreadable in-progress marker");
                self.storage.remove(&StorageKeys::in_progress()).await?;
                return Ok(false);
            }
        };

        if marker.identity != *identity {
            return Ok(false);
        }
        if marker.is_stale_at(self.clock.now(), self.stale_after) {
            info!(identity = %identity, tag = %marker.tag, "removing stale in-progress marker");
            self.storage.remove(&StorageKeys::in_progress()).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Claim the slot for `identity` and return the new tag.
    ///
    /// Overwrites whatever is there.
    pub async fn claim(&self, identity: &Identity) -> Result<Uuid, StorageError> {
        let marker = InProgressMarker::new(identity.clone(), self.clock.now());
        let tag = marker.tag;
        self.storage
            .put(&StorageKeys::in_progress(), &serde_json::to_string(&marker)?)
            .await?;
        debug!(identity = %identity, %tag, "in-progress marker claimed");
        Ok(tag)
    }

    /// Remove the marker, whoever wrote it.
    pub async fn release(&self) -> Result<(), StorageError> {
        self.storage.remove(&StorageKeys::in_progress()).await
    }

    /// Remove the marker only if it still carries `tag`.
    ///
    /// Returns whether it was removed.
    pub async fn release_if_owned(&self, tag: Uuid) -> Result<bool, StorageError> {
        match self.read().await? {
            Some(marker) if marker.tag == tag => {
                self.release().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
