//! Supervise command orchestration.
//!
//! Validates arguments, recovers the capture directory, then runs the
//! supervisor loop until shutdown or until the restart budget is exhausted.

use capd_clock::Clock;
use capd_fs::Filesystem;

use crate::cli::SuperviseArgs;
use crate::logger::Logger;
use crate::session::CaptureLauncher;
use crate::signal::{RotateRequest, ShutdownCheck};
use crate::sleeper::Sleeper;
use crate::supervisor::{Supervisor, SupervisorSummary};

use super::CommandResult;

/// Execute the supervise command.
///
/// The launcher decides what "capture" means: `TsharkLauncher` in production,
/// a scripted launcher in tests.
#[allow(clippy::too_many_arguments)]
pub fn execute_supervise<L, C, F, S, H, R, G>(
    args: &SuperviseArgs,
    launcher: L,
    clock: &C,
    fs: &F,
    sleeper: &S,
    shutdown: &H,
    rotate: &R,
    logger: &G,
) -> CommandResult<SupervisorSummary>
where
    L: CaptureLauncher,
    C: Clock,
    F: Filesystem,
    S: Sleeper,
    H: ShutdownCheck,
    R: RotateRequest,
    G: Logger,
{
    args.validate()?;
    let config = args.to_config();

    logger.verbose(&format!(
        "Starting supervisor: dir={}, interface={}, rotation={}s/{}B, budget={}B, max_files={}, backoff={}..{}s",
        config.capture_dir.display(),
        args.interface,
        config.rotation.max_duration_secs,
        config.rotation.max_size_bytes,
        config.retention.budget_bytes,
        config.retention.max_files,
        config.backoff.initial_secs,
        config.backoff.max_secs,
    ));

    let mut supervisor = Supervisor::new(config, launcher, fs, clock, logger)?;
    let summary = supervisor.run(sleeper, shutdown, rotate)?;

    logger.info(&format!(
        "Supervisor finished: {} sessions, {} rotations, {} restarts, {} segments retained ({} bytes)",
        summary.stats.sessions_started,
        summary.stats.rotations,
        summary.stats.restarts,
        summary.retained_files,
        summary.retained_bytes
    ));

    Ok(summary)
}
