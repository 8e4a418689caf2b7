//! Command orchestration for CLI subcommands.
//!
//! Provides execute functions for:
//! - `supervise` - Run the capture supervisor
//! - `scan` - Print the retained segments of a capture directory
//! - `emit` - Send a UDP heartbeat

pub mod emit;
pub mod scan;
pub mod supervise;

pub use emit::{execute_emit, EmitError, EmitResult};
pub use scan::{execute_scan, ScanLine, ScanResult, ScanTotals};
pub use supervise::execute_supervise;

use crate::cli::CliError;
use crate::supervisor::SupervisorError;
use capd_fs::FsError;
use thiserror::Error;

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CliError),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] FsError),

    #[error("{0}")]
    Supervisor(#[from] SupervisorError),

    #[error("emit error: {0}")]
    Emit(#[from] EmitError),

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Result of command execution.
pub type CommandResult<T> = Result<T, CommandError>;
