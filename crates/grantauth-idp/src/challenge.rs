//! Outstanding sign-in challenges.
//!
//! Every `/login` issues a fresh challenge; several may be outstanding for
//! one identity at once, since two contexts can drive the same sign-in. A
//! challenge is answered at most once. A signature that matches none of the
//! outstanding challenges burns the oldest one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use grantauth_models::Identity;
use uuid::Uuid;

use crate::error::IdpError;

/// Outstanding challenges kept per identity; older ones are dropped first.
const MAX_PER_IDENTITY: usize = 8;

#[derive(Debug, Clone)]
struct Issued {
    challenge: String,
    issued_at: DateTime<Utc>,
}

/// In-memory challenge book.
#[derive(Debug)]
pub struct ChallengeBook {
    entries: Mutex<HashMap<Identity, VecDeque<Issued>>>,
    ttl: TimeDelta,
}

impl ChallengeBook {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::minutes(5)),
        }
    }

    /// Issue a fresh challenge for `identity`.
    pub fn issue(&self, identity: &Identity) -> String {
        self.issue_at(identity, Utc::now())
    }

    /// Consume the outstanding challenge for `identity` that `verify`
    /// accepts.
    pub fn redeem(
        &self,
        identity: &Identity,
        verify: impl Fn(&str) -> bool,
    ) -> Result<String, IdpError> {
        self.redeem_at(identity, verify, Utc::now())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, VecDeque<Issued>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> String {
        let challenge = format!(
            "Sign in to grantauth as {identity}\nNonce: {}\nIssued at: {}",
            Uuid::new_v4(),
            now.to_rfc3339()
        );
        let mut entries = self.lock();
        // Drop anything that can no longer be answered.
        for queue in entries.values_mut() {
            queue.retain(|issued| now - issued.issued_at <= self.ttl);
        }
        entries.retain(|_, queue| !queue.is_empty());

        let queue = entries.entry(identity.clone()).or_default();
        if queue.len() == MAX_PER_IDENTITY {
            queue.pop_front();
        }
        queue.push_back(Issued {
            challenge: challenge.clone(),
            issued_at: now,
        });
        challenge
    }

    fn redeem_at(
        &self,
        identity: &Identity,
        verify: impl Fn(&str) -> bool,
        now: DateTime<Utc>,
    ) -> Result<String, IdpError> {
        let mut entries = self.lock();
        let Some(queue) = entries.get_mut(identity) else {
            return Err(IdpError::NoChallenge(identity.to_string()));
        };
        queue.retain(|issued| now - issued.issued_at <= self.ttl);
        if queue.is_empty() {
            entries.remove(identity);
            return Err(IdpError::NoChallenge(identity.to_string()));
        }

        let redeemed = match queue.iter().position(|issued| verify(&issued.challenge)) {
            Some(idx) => queue.remove(idx).map(|issued| issued.challenge),
            None => {
                queue.pop_front();
                None
            }
        };
        if queue.is_empty() {
            entries.remove(identity);
        }
        redeemed.ok_or_else(|| IdpError::InvalidSignature(identity.to_string()))
    }

    /// Number of outstanding challenges across all identities.
    pub fn outstanding(&self) -> usize {
        self.lock().values().map(VecDeque::len).sum()
    }
}
