//! Shared key-value storage.
//!
//! [`SharedStorage`] is the only channel through which contexts share state
//! besides the broadcast bus. Operations are last-write-wins with no
//! compare-and-swap; the protocol is built to tolerate that.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;

/// String key-value storage visible to every execution context.
#[async_trait]
pub trait SharedStorage: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage shared by cloning.
///
/// Every clone sees the same map, so several coordinators built from clones
/// behave like tabs sharing one origin's storage. An optional per-operation
/// latency turns each call into a real suspension point, which widens the
/// race windows the protocol has to tolerate.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    latency: Duration,
}

impl MemoryStorage {
    /// Create an empty store with no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that sleeps `latency` before every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl SharedStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.delay().await;
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.delay().await;
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.delay().await;
        self.lock().remove(key);
        Ok(())
    }
}
