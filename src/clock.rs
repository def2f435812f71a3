//! Time source abstraction
//!
//! Stores and the manager read the current time through [`Clock`] so lease
//! expiry and retry back-off can be driven deterministically in tests.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += to_chrono(by);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Convert a std duration, saturating at the largest millisecond count chrono accepts.
pub fn to_chrono(d: Duration) -> chrono::Duration {
    let millis = i64::try_from(d.as_millis()).unwrap_or(i64::MAX / 1_000);
    chrono::Duration::milliseconds(millis.min(i64::MAX / 1_000))
}
