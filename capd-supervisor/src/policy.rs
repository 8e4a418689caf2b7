//! Rotation policy for the active capture file.

/// When to close the active capture file and open a new one.
///
/// Either threshold triggers rotation on its own; zero disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the session has been capturing this long.
    pub max_duration_secs: u64,

    /// Rotate once the output file reaches this size.
    pub max_size_bytes: u64,
}

impl RotationPolicy {
    pub fn new(max_duration_secs: u64, max_size_bytes: u64) -> Self {
        Self {
            max_duration_secs,
            max_size_bytes,
        }
    }

    /// Never rotate automatically; files close only on crash or shutdown.
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    pub fn is_disabled(&self) -> bool {
        self.max_duration_secs == 0 && self.max_size_bytes == 0
    }

    /// True once either enabled threshold has been reached.
    pub fn should_rotate(&self, elapsed_secs: u64, size_bytes: u64) -> bool {
        let by_time = self.max_duration_secs > 0 && elapsed_secs >= self.max_duration_secs;
        let by_size = self.max_size_bytes > 0 && size_bytes >= self.max_size_bytes;
        by_time || by_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_only() {
        let policy = RotationPolicy::new(60, 0);
        assert!(!policy.should_rotate(59, u64::MAX));
        assert!(policy.should_rotate(60, 0));
        assert!(policy.should_rotate(61, 0));
    }

    #[test]
    fn test_size_only() {
        let policy = RotationPolicy::new(0, 1_000);
        assert!(!policy.should_rotate(u64::MAX, 999));
        assert!(policy.should_rotate(0, 1_000));
    }

    #[test]
    fn test_either_threshold_triggers() {
        let policy = RotationPolicy::new(60, 1_000);
        assert!(!policy.should_rotate(10, 10));
        assert!(policy.should_rotate(60, 10));
        assert!(policy.should_rotate(10, 1_000));
        assert!(policy.should_rotate(60, 1_000));
    }

    #[test]
    fn test_disabled_never_rotates() {
        let policy = RotationPolicy::disabled();
        assert!(policy.is_disabled());
        assert!(!policy.should_rotate(u64::MAX, u64::MAX));
    }

    #[test]
    fn test_partial_disable_is_not_disabled() {
        assert!(!RotationPolicy::new(60, 0).is_disabled());
        assert!(!RotationPolicy::new(0, 1).is_disabled());
    }
}
