//! Signal handling for graceful shutdown and on-demand rotation.
//!
//! - [`ShutdownFlag`] is set by SIGINT/SIGTERM and observed by the supervisor
//!   at the next tick.
//! - [`RotateFlag`] is set by SIGUSR1 and makes the supervisor rotate the
//!   active capture file at the next tick.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Trait for checking shutdown status.
pub trait ShutdownCheck: Send + Sync {
    /// Returns true if shutdown has been requested.
    fn should_stop(&self) -> bool;
}

/// Flag that tracks whether shutdown has been requested.
///
/// When created with `new()`, registers a SIGINT/SIGTERM handler that sets
/// the flag.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownFlag {
    /// Create a new shutdown flag and register the termination handler.
    ///
    /// If the handler cannot be registered (e.g., already registered), this
    /// still returns a valid flag that can be manually triggered.
    pub fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();

        let _ = ctrlc::set_handler(move || {
            flag_clone.store(true, Ordering::SeqCst);
        });

        Self { flag }
    }

    /// Create a shutdown flag without registering a handler.
    pub fn manual() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Manually trigger shutdown.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownCheck for ShutdownFlag {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Mock shutdown checker for testing - never signals shutdown.
#[derive(Debug, Default, Clone)]
pub struct NeverShutdown;

impl ShutdownCheck for NeverShutdown {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Mock shutdown checker that signals shutdown after a number of checks.
#[derive(Debug)]
pub struct ShutdownAfter {
    remaining: AtomicUsize,
}

impl ShutdownAfter {
    /// Report "keep running" for `checks` calls, then "stop" forever.
    pub fn new(checks: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(checks),
        }
    }
}

impl ShutdownCheck for ShutdownAfter {
    fn should_stop(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

/// Trait for consuming external rotate-now requests.
pub trait RotateRequest: Send + Sync {
    /// Returns true once per pending request and clears it.
    fn take_request(&self) -> bool;
}

/// Flag set by SIGUSR1 (or manually) to request an immediate rotation.
#[derive(Debug, Clone)]
pub struct RotateFlag {
    flag: Arc<AtomicBool>,
}

impl RotateFlag {
    /// Create a flag and register the SIGUSR1 handler where supported.
    pub fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));

        #[cfg(unix)]
        {
            let _ = signal_hook::flag::register(signal_hook::consts::SIGUSR1, flag.clone());
        }

        Self { flag }
    }

    /// Create a flag without registering a handler.
    pub fn manual() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Default for RotateFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RotateRequest for RotateFlag {
    fn take_request(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Rotate-request source that never asks for a rotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRotateRequests;

impl RotateRequest for NoRotateRequests {
    fn take_request(&self) -> bool {
        false
    }
}
