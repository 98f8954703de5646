//! Timestamp utilities and clock abstraction
//!
//! Cache TTL checks and progress timestamps read time through [`Clock`] so
//! tests can drive expiry deterministically with [`ManualClock`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current UTC timestamp
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replay tooling
///
/// Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: std::time::Duration) {
        // Out-of-range durations saturate at a century
        let delta = ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::days(36_500));
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += delta;
    }

    /// Jump to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
