//! capd capture supervisor.
//!
//! This crate keeps a packet-capture subprocess running, rotates its output
//! into timestamped segments, keeps the capture directory under a storage
//! budget, and restarts the subprocess with exponential backoff when it fails.

pub mod backoff;
pub mod cli;
pub mod commands;
pub mod exit;
pub mod io;
pub mod logger;
pub mod policy;
pub mod scripted;
pub mod session;
pub mod signal;
pub mod sleeper;
pub mod supervisor;
pub mod tshark;

pub use backoff::BackoffPolicy;
pub use cli::{parse_from, Cli, CliError, Command, EmitArgs, ScanArgs, SuperviseArgs};
pub use commands::{
    execute_emit, execute_scan, execute_supervise, CommandError, CommandResult, EmitError,
};
pub use logger::{init_tracing, LogLevel, Logger, MockLogger, NullLogger, TracingLogger, Verbosity};
pub use policy::RotationPolicy;
pub use scripted::{LaunchScript, ScriptedLauncher, ScriptedSession, SessionScript};
pub use session::{
    CaptureLauncher, CaptureSession, LaunchError, ProcessSession, SessionError, SessionStatus,
};
pub use signal::{
    NeverShutdown, NoRotateRequests, RotateFlag, RotateRequest, ShutdownAfter, ShutdownCheck,
    ShutdownFlag,
};
pub use sleeper::{ClockSleeper, MockSleeper, RealSleeper, Sleeper};
pub use supervisor::{
    CaptureFailure, Phase, Supervisor, SupervisorConfig, SupervisorError, SupervisorStats,
    SupervisorSummary,
};
pub use tshark::{TsharkConfig, TsharkLauncher};
