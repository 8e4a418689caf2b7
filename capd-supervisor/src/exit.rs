//! Exit codes for the capd CLI.
//!
//! Following Unix conventions for exit codes.

use crate::commands::CommandError;
use crate::supervisor::SupervisorError;

/// Exit code constants.
pub mod codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Invalid arguments.
    pub const INVALID_ARGS: i32 = 1;
    /// IO error.
    pub const IO_ERROR: i32 = 2;
    /// Capture restart budget exhausted.
    pub const RESTARTS_EXHAUSTED: i32 = 3;
    /// Heartbeat emitter error.
    pub const EMIT_ERROR: i32 = 4;
}

/// Map a CommandError to an exit code.
pub fn exit_code(error: &CommandError) -> i32 {
    match error {
        CommandError::InvalidArgument(_) => codes::INVALID_ARGS,
        CommandError::Filesystem(_) => codes::IO_ERROR,
        CommandError::Supervisor(SupervisorError::Filesystem(_)) => codes::IO_ERROR,
        CommandError::Supervisor(SupervisorError::ExhaustedRetries { .. }) => {
            codes::RESTARTS_EXHAUSTED
        }
        CommandError::Emit(_) => codes::EMIT_ERROR,
        CommandError::Output(_) => codes::IO_ERROR,
    }
}

/// True when the supervisor loop already logged this error as its final line.
pub fn already_logged(error: &CommandError) -> bool {
    matches!(
        error,
        CommandError::Supervisor(SupervisorError::ExhaustedRetries { .. })
    )
}
