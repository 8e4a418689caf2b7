//! CLI argument parsing for capd.
//!
//! Provides the command-line interface for the `capd` binary with
//! supervise, scan, and emit subcommands.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use capd_fs::{PartialFilePolicy, RetentionConfig};
use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::backoff::BackoffPolicy;
use crate::policy::RotationPolicy;
use crate::supervisor::{
    SupervisorConfig, DEFAULT_GRACE_TIMEOUT_SEC, DEFAULT_MIN_HEALTHY_SEC,
    DEFAULT_STATUS_INTERVAL_SEC, DEFAULT_TICK_INTERVAL_SEC,
};
use crate::tshark::{TsharkConfig, DEFAULT_CAPTURE_BINARY, DEFAULT_INTERFACE};

/// Default directory for capture segments.
pub const DEFAULT_CAPTURE_DIR: &str = "/captures";

/// Default segment duration in seconds.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 60;

/// Default storage budget (10 GB).
pub const DEFAULT_STORAGE_BUDGET_BYTES: u64 = 10_000_000_000;

/// Default first restart delay in seconds.
pub const DEFAULT_BACKOFF_INITIAL_SECS: u64 = 1;

/// Default restart delay ceiling in seconds.
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;

/// Default heartbeat interval in milliseconds.
pub const DEFAULT_EMIT_INTERVAL_MS: u64 = 50;

/// Default heartbeat payload.
pub const DEFAULT_EMIT_PAYLOAD: &str = "heartbeat";

/// Version string with build metadata.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Errors from CLI argument validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("rotation is disabled (max-duration-sec and max-size-bytes are both 0); pass --no-rotation to allow this")]
    RotationDisabled,

    #[error("--no-rotation conflicts with max-duration-sec={0} / max-size-bytes={1}")]
    ConflictingRotation(u64, u64),

    #[error("backoff-initial-sec must be at least 1, got {0}")]
    InvalidBackoffInitial(u64),

    #[error("backoff-max-sec ({max}) must be at least backoff-initial-sec ({initial})")]
    InvalidBackoffMax { initial: u64, max: u64 },

    #[error("tick-interval-sec must be at least 1, got {0}")]
    InvalidTickInterval(u64),

    #[error("status-interval-sec must be at least 1, got {0}")]
    InvalidStatusInterval(u64),

    #[error("interface must not be empty")]
    EmptyInterface,

    #[error("interval-ms must be at least 1, got {0}")]
    InvalidEmitInterval(u64),

    #[error("payload must not be empty")]
    EmptyPayload,
}

/// capd - Capture supervisor with rotation, retention and restart backoff.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "capd")]
#[command(version = LONG_VERSION, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v verbose, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the capture supervisor until interrupted.
    Supervise(SuperviseArgs),
    /// Print the retained segments of a capture directory as JSON lines.
    Scan(ScanArgs),
    /// Send a UDP heartbeat at a fixed interval.
    Emit(EmitArgs),
}

/// Arguments for the supervise command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct SuperviseArgs {
    /// Directory for capture segments.
    #[arg(short = 'd', long, default_value = DEFAULT_CAPTURE_DIR)]
    pub capture_dir: PathBuf,

    /// Interface to capture on.
    #[arg(short, long, default_value = DEFAULT_INTERFACE)]
    pub interface: String,

    /// BPF capture filter.
    #[arg(short = 'f', long)]
    pub capture_filter: Option<String>,

    /// Capture binary to launch.
    #[arg(long, default_value = DEFAULT_CAPTURE_BINARY)]
    pub capture_binary: PathBuf,

    /// Extra argument for the capture binary (repeatable).
    #[arg(long = "capture-arg", allow_hyphen_values = true)]
    pub capture_args: Vec<String>,

    /// Rotate after this many seconds (0 disables).
    #[arg(long, default_value_t = DEFAULT_MAX_DURATION_SECS)]
    pub max_duration_sec: u64,

    /// Rotate once the segment reaches this size (0 disables).
    #[arg(long, default_value_t = 0)]
    pub max_size_bytes: u64,

    /// Never rotate automatically; requires both thresholds at 0.
    #[arg(long)]
    pub no_rotation: bool,

    /// Total bytes of closed segments to retain (0 = unlimited).
    #[arg(long, default_value_t = DEFAULT_STORAGE_BUDGET_BYTES)]
    pub storage_budget_bytes: u64,

    /// Closed segments to retain (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    pub max_files: usize,

    /// First restart delay in seconds.
    #[arg(long, default_value_t = DEFAULT_BACKOFF_INITIAL_SECS)]
    pub backoff_initial_sec: u64,

    /// Restart delay ceiling in seconds.
    #[arg(long, default_value_t = DEFAULT_BACKOFF_MAX_SECS)]
    pub backoff_max_sec: u64,

    /// Seconds of healthy capture before the failure count resets.
    #[arg(long, default_value_t = DEFAULT_MIN_HEALTHY_SEC)]
    pub min_healthy_sec: u64,

    /// Give up after this many consecutive failures. Unlimited if unset.
    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// Seconds to wait for a stopping capture before SIGKILL.
    #[arg(long, default_value_t = DEFAULT_GRACE_TIMEOUT_SEC)]
    pub grace_timeout_sec: u64,

    /// Seconds between supervisor ticks.
    #[arg(long, default_value_t = DEFAULT_TICK_INTERVAL_SEC)]
    pub tick_interval_sec: u64,

    /// Handling of leftover .part segments at startup (admit or discard).
    #[arg(long, default_value_t = PartialFilePolicy::Admit)]
    pub partial_files: PartialFilePolicy,

    /// Append status heartbeat lines to this file.
    #[arg(long)]
    pub status_file: Option<PathBuf>,

    /// Seconds between status lines.
    #[arg(long, default_value_t = DEFAULT_STATUS_INTERVAL_SEC)]
    pub status_interval_sec: u64,
}

impl SuperviseArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        let thresholds_off = self.max_duration_sec == 0 && self.max_size_bytes == 0;
        if self.no_rotation && !thresholds_off {
            return Err(CliError::ConflictingRotation(
                self.max_duration_sec,
                self.max_size_bytes,
            ));
        }
        if !self.no_rotation && thresholds_off {
            return Err(CliError::RotationDisabled);
        }
        if self.interface.trim().is_empty() {
            return Err(CliError::EmptyInterface);
        }
        if self.backoff_initial_sec == 0 {
            return Err(CliError::InvalidBackoffInitial(self.backoff_initial_sec));
        }
        if self.backoff_max_sec < self.backoff_initial_sec {
            return Err(CliError::InvalidBackoffMax {
                initial: self.backoff_initial_sec,
                max: self.backoff_max_sec,
            });
        }
        if self.tick_interval_sec == 0 {
            return Err(CliError::InvalidTickInterval(self.tick_interval_sec));
        }
        if self.status_interval_sec == 0 {
            return Err(CliError::InvalidStatusInterval(self.status_interval_sec));
        }
        Ok(())
    }

    /// Build the supervisor configuration.
    pub fn to_config(&self) -> SupervisorConfig {
        let rotation = if self.no_rotation {
            RotationPolicy::disabled()
        } else {
            RotationPolicy::new(self.max_duration_sec, self.max_size_bytes)
        };

        SupervisorConfig {
            capture_dir: self.capture_dir.clone(),
            rotation,
            retention: RetentionConfig::new(self.storage_budget_bytes, self.max_files),
            backoff: BackoffPolicy::new(self.backoff_initial_sec, self.backoff_max_sec),
            min_healthy_secs: self.min_healthy_sec,
            max_restarts: self.max_restarts,
            grace_timeout: Duration::from_secs(self.grace_timeout_sec),
            tick_interval_secs: self.tick_interval_sec,
            partial_files: self.partial_files,
            status_file: self.status_file.clone(),
            status_interval_secs: self.status_interval_sec,
        }
    }

    /// Build the capture tool invocation.
    pub fn tshark_config(&self) -> TsharkConfig {
        TsharkConfig {
            binary: self.capture_binary.clone(),
            interface: self.interface.clone(),
            capture_filter: self.capture_filter.clone(),
            extra_args: self.capture_args.clone(),
        }
    }
}

/// Arguments for the scan command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct ScanArgs {
    /// Directory to scan.
    #[arg(short = 'd', long, default_value = DEFAULT_CAPTURE_DIR)]
    pub capture_dir: PathBuf,
}

/// Arguments for the emit command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct EmitArgs {
    /// Destination address (ip:port).
    #[arg(short, long)]
    pub target: SocketAddr,

    /// Milliseconds between datagrams.
    #[arg(long, default_value_t = DEFAULT_EMIT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Datagram payload.
    #[arg(long, default_value = DEFAULT_EMIT_PAYLOAD)]
    pub payload: String,

    /// Stop after this many datagrams. Runs until interrupted if unset.
    #[arg(short = 'n', long)]
    pub count: Option<u64>,
}

impl EmitArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.interval_ms == 0 {
            return Err(CliError::InvalidEmitInterval(self.interval_ms));
        }
        if self.payload.is_empty() {
            return Err(CliError::EmptyPayload);
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Parse CLI arguments from an iterator of strings.
/// Useful for testing.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}
