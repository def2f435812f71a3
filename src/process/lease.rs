//! Time-bounded exclusive claim on a process

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lease held by one manager instance.
///
/// A lease is expired once `now >= expires_at`; an expired lease no longer
/// blocks other owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(owner: impl Into<String>, now: DateTime<Utc>, duration: chrono::Duration) -> Self {
        Self {
            owner: owner.into(),
            acquired_at: now,
            expires_at: now + duration,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Held by `owner` and not yet expired.
    pub fn is_held_by(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.owner == owner && !self.is_expired(now)
    }
}
