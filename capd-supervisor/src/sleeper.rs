//! Sleep abstraction for testable control loops.
//!
//! The supervisor waits between ticks and during restart backoff through
//! [`Sleeper`], so tests can replace real waiting with a clock advance.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use capd_clock::ManualClock;

/// Trait for sleeping between loop iterations.
pub trait Sleeper: Send + Sync {
    /// Sleep for the given duration.
    fn sleep(&self, duration: Duration);

    /// Sleep for the specified number of seconds.
    fn sleep_sec(&self, seconds: u64) {
        self.sleep(Duration::from_secs(seconds));
    }
}

/// Real sleeper that uses `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Mock sleeper for testing - returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSleeper;

impl Sleeper for MockSleeper {
    fn sleep(&self, _duration: Duration) {}
}

/// Sleeper that advances a [`ManualClock`] instead of waiting.
///
/// Every requested sleep is recorded, which lets tests check the exact
/// backoff schedule the supervisor produced.
#[derive(Debug, Clone)]
pub struct ClockSleeper {
    clock: ManualClock,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ClockSleeper {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All sleeps requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Sum of all sleeps requested so far.
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for ClockSleeper {
    fn sleep(&self, duration: Duration) {
        self.clock.advance(duration.as_secs());
        self.sleeps.lock().unwrap().push(duration);
    }
}
