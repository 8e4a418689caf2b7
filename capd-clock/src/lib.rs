//! Clock abstraction for capd.
//!
//! Every time-dependent decision in the supervisor (rotation deadlines, backoff
//! deadlines, healthy-duration resets, file naming) reads time through the
//! [`Clock`] trait so the control loop can be driven deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for getting the current Unix timestamp.
pub trait Clock: Send + Sync {
    /// Returns the current time as Unix seconds since epoch.
    fn now_unix_sec(&self) -> u64;
}

/// Real system clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Mock clock for testing with a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    timestamp: u64,
}

impl MockClock {
    /// Create a mock clock with a fixed timestamp.
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }
}

impl Clock for MockClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp
    }
}

/// Clock whose time only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one handle to the
/// supervisor and keep another to advance time (typically from a sleeper).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    timestamp: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock starting at `timestamp`.
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: Arc::new(AtomicU64::new(timestamp)),
        }
    }

    /// Move time forward by `seconds`.
    pub fn advance(&self, seconds: u64) {
        self.timestamp.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Jump to an absolute timestamp.
    pub fn set(&self, timestamp: u64) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_unix_sec(&self) -> u64 {
        (**self).now_unix_sec()
    }
}
