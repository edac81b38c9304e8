//! Identities this context is itself waiting on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grantauth_models::Identity;

/// Per-context, in-memory set of identities with an attempt in flight.
///
/// Never persisted; clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    inner: Arc<Mutex<HashSet<Identity>>>,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `identity`; returns `false` if it was already present.
    pub fn insert(&self, identity: &Identity) -> bool {
        self.lock().insert(identity.clone())
    }

    /// Remove `identity`; returns whether it was present.
    pub fn remove(&self, identity: &Identity) -> bool {
        self.lock().remove(identity)
    }

    /// Whether `identity` is pending.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.lock().contains(identity)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pending identities.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Identity>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
