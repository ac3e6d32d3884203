//! Wall clock abstraction.
//!
//! Breaker recovery and rate-limit buckets are computed from `now()` in
//! seconds since the epoch, so every process sharing a store must use a
//! loosely synchronized wall clock. Small skew is tolerated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;

    /// Whole seconds, as used for bucket arithmetic.
    fn now_secs(&self) -> u64 {
        self.now().max(0.0).floor() as u64
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// A clock that only moves when told to. Millisecond resolution.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            millis: AtomicU64::new(secs_to_millis(start_secs)),
        }
    }

    pub fn set(&self, secs: f64) {
        self.millis.store(secs_to_millis(secs), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.millis.fetch_add(secs_to_millis(secs), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

fn secs_to_millis(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}
