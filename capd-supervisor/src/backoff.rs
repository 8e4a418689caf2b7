//! Restart backoff.

/// Exponential restart delay keyed by the consecutive-failure count.
///
/// The first failure waits `initial_secs`, each further failure doubles the
/// wait, capped at `max_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_secs: u64,
    pub max_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_secs: 1,
            max_secs: 60,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial_secs: u64, max_secs: u64) -> Self {
        Self {
            initial_secs,
            max_secs,
        }
    }

    /// Delay before the next start attempt after `failures` consecutive failures.
    pub fn delay_secs(&self, failures: u32) -> u64 {
        if failures == 0 {
            return 0;
        }
        let shift = (failures - 1).min(63);
        self.initial_secs
            .checked_mul(1u64 << shift)
            .unwrap_or(u64::MAX)
            .min(self.max_secs)
    }
}
