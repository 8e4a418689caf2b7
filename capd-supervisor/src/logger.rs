//! Logging abstraction for testable output.
//!
//! Components log through the [`Logger`] trait. In production
//! [`TracingLogger`] forwards to `tracing`; tests use [`MockLogger`] to
//! assert on what would have been logged.

use std::sync::{Arc, RwLock};

use tracing_subscriber::EnvFilter;

/// Verbosity selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Normal output (always shown)
    Normal,
    /// Verbose output (-v flag)
    Verbose,
    /// Debug output (-vv flag)
    Debug,
}

impl Verbosity {
    /// Create verbosity from CLI flag count.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }

    /// Default `tracing` filter directive for this verbosity.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Debug => "trace",
        }
    }
}

/// Severity of a single log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
}

/// Trait for logging output.
pub trait Logger: Send + Sync {
    /// Log a message at the given level.
    fn log(&self, level: LogLevel, message: &str);

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log at verbose level (requires -v).
    fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }

    /// Log at debug level (requires -vv).
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

impl<L: Logger + ?Sized> Logger for &L {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}

/// Logger that emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Verbose => tracing::debug!("{}", message),
            LogLevel::Debug => tracing::trace!("{}", message),
        }
    }
}

/// Install the global stderr subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived filter when set. Calling this
/// more than once is harmless.
pub fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Mock logger for testing that captures all messages.
#[derive(Debug, Clone, Default)]
pub struct MockLogger {
    messages: Arc<RwLock<Vec<LogEntry>>>,
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl MockLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured log entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.messages.read().unwrap().clone()
    }

    /// Get all captured messages (just the text).
    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    /// Get messages at a specific level.
    pub fn messages_at_level(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    /// Check if any message contains the given substring.
    pub fn contains(&self, substring: &str) -> bool {
        self.messages().iter().any(|m| m.contains(substring))
    }

    pub fn count(&self) -> usize {
        self.messages.read().unwrap().len()
    }
}

impl Logger for MockLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.messages.write().unwrap().push(LogEntry {
            level,
            message: message.to_string(),
        });
    }
}

/// A no-op logger that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}
