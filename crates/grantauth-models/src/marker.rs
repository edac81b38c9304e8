//! The shared "authentication in progress" record.
//!
//! At most one [`InProgressMarker`] exists per storage namespace. It is an
//! advisory, time-bounded claim that some context is currently driving a
//! sign-in for an identity. Any reader may discard a marker once it is older
//! than the staleness window.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

/// Advisory claim that `identity` is being authenticated somewhere.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InProgressMarker {
    /// The identity being authenticated.
    pub identity: Identity,
    /// When the claim was written, in unix milliseconds.
    pub started_at: i64,
    /// Random tag distinguishing one claim from another.
    pub tag: Uuid,
}

impl InProgressMarker {
    /// Create a marker for `identity` stamped at `now` with a fresh tag.
    pub fn new(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            started_at: now.timestamp_millis(),
            tag: Uuid::new_v4(),
        }
    }

    /// The time the claim was written.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.started_at).single()
    }

    /// Whether the marker is older than `window` at `now`.
    ///
    /// A marker stamped in the future (clock skew between contexts) is not
    /// stale.
    pub fn is_stale_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let age_ms = now.timestamp_millis() - self.started_at;
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        age_ms > window_ms
    }
}
