//! Supervisor loop.
//!
//! Drives one capture session at a time through an explicit state machine:
//!
//! ```text
//! Idle -> Starting -> Capturing -> Rotating -> Starting
//!                         |
//!                         +-> Restarting -> Starting
//! any -> ShuttingDown -> Stopped
//! ```
//!
//! Each call to [`Supervisor::tick`] performs every transition that is due at
//! the current clock reading, so a rotation closes the old segment and starts
//! the new one within a single tick. Blocking is limited to
//! [`CaptureSession::stop`] and the sleeps between ticks in [`Supervisor::run`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capd_clock::Clock;
use capd_fs::{
    finished_path, recover_ledger, CaptureFile, CaptureName, EvictionReport, Filesystem, FsError,
    PartialFilePolicy, RetentionConfig, RetentionLedger, RetentionManager,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::BackoffPolicy;
use crate::io::{StatusLine, StatusWriter};
use crate::logger::Logger;
use crate::policy::RotationPolicy;
use crate::session::{CaptureLauncher, CaptureSession, LaunchError, SessionError, SessionStatus};
use crate::signal::{RotateRequest, ShutdownCheck};
use crate::sleeper::Sleeper;

/// Default seconds between ticks.
pub const DEFAULT_TICK_INTERVAL_SEC: u64 = 1;

/// Default seconds of failure-free capture before the failure count resets.
pub const DEFAULT_MIN_HEALTHY_SEC: u64 = 30;

/// Default grace period for a stopping session.
pub const DEFAULT_GRACE_TIMEOUT_SEC: u64 = 10;

/// Default seconds between status heartbeat lines.
pub const DEFAULT_STATUS_INTERVAL_SEC: u64 = 60;

/// Immutable supervisor configuration, validated before construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub capture_dir: PathBuf,
    pub rotation: RotationPolicy,
    pub retention: RetentionConfig,
    pub backoff: BackoffPolicy,
    pub min_healthy_secs: u64,
    /// Consecutive failures tolerated before giving up. `None` retries forever.
    pub max_restarts: Option<u32>,
    pub grace_timeout: Duration,
    pub tick_interval_secs: u64,
    pub partial_files: PartialFilePolicy,
    pub status_file: Option<PathBuf>,
    pub status_interval_secs: u64,
}

impl SupervisorConfig {
    pub fn new(capture_dir: PathBuf) -> Self {
        Self {
            capture_dir,
            rotation: RotationPolicy::new(3600, 0),
            retention: RetentionConfig::default(),
            backoff: BackoffPolicy::default(),
            min_healthy_secs: DEFAULT_MIN_HEALTHY_SEC,
            max_restarts: None,
            grace_timeout: Duration::from_secs(DEFAULT_GRACE_TIMEOUT_SEC),
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SEC,
            partial_files: PartialFilePolicy::default(),
            status_file: None,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SEC,
        }
    }
}

/// Supervisor phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Starting,
    Capturing,
    Rotating,
    Restarting,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Capturing => "capturing",
            Phase::Rotating => "rotating",
            Phase::Restarting => "restarting",
            Phase::ShuttingDown => "shutting_down",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A recoverable capture failure. Each one counts toward the restart budget.
#[derive(Debug, Error)]
pub enum CaptureFailure {
    #[error("{0}")]
    Launch(#[from] LaunchError),

    #[error("capture session {0}")]
    Crashed(SessionStatus),

    #[error("capture file I/O failed for {}: {source}", path.display())]
    RotationIo {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("{0}")]
    Session(#[from] SessionError),
}

/// Errors that end the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("giving up after {attempts} consecutive capture failures; last error: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },

    #[error("capture directory error: {0}")]
    Filesystem(#[from] FsError),
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub sessions_started: u64,
    pub rotations: u64,
    pub restarts: u64,
    pub files_admitted: u64,
    pub files_discarded: u64,
    pub files_evicted: u64,
    pub eviction_failures: u64,
}

/// The running session and the segment it writes.
#[derive(Debug)]
pub struct ActiveCapture<S> {
    pub session: S,
    /// Segment in `Open` state at its `.part` path.
    pub file: CaptureFile,
    pub started_at: u64,
    /// Last tick at which the session polled as running.
    pub last_healthy_at: u64,
}

/// State threaded through the loop.
#[derive(Debug)]
pub struct SupervisorState<S> {
    pub phase: Phase,
    pub active: Option<ActiveCapture<S>>,
    pub consecutive_failures: u32,
    /// Start of the current failure-free stretch. Survives clean rotations
    /// and is cleared by every failure.
    pub healthy_since: Option<u64>,
    /// Earliest time the next start may be attempted.
    pub backoff_until: Option<u64>,
    pub last_error: Option<String>,
    pub next_sequence: u64,
    pub stats: SupervisorStats,
}

/// Final report returned by [`Supervisor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSummary {
    pub stats: SupervisorStats,
    pub retained_files: usize,
    pub retained_bytes: u64,
    pub last_error: Option<String>,
}

/// Capture supervisor over a launcher, filesystem, clock and logger.
pub struct Supervisor<L, F, C, G>
where
    L: CaptureLauncher,
{
    config: SupervisorConfig,
    launcher: L,
    fs: F,
    clock: C,
    logger: G,
    retention: RetentionManager,
    state: SupervisorState<L::Session>,
    last_status_at: Option<u64>,
}

impl<L, F, C, G> Supervisor<L, F, C, G>
where
    L: CaptureLauncher,
    F: Filesystem,
    C: Clock,
    G: Logger,
{
    /// Recover the capture directory and enforce retention before the first
    /// session starts.
    pub fn new(
        config: SupervisorConfig,
        launcher: L,
        fs: F,
        clock: C,
        logger: G,
    ) -> Result<Self, SupervisorError> {
        fs.create_dir_all(&config.capture_dir)?;
        let recovered = recover_ledger(&fs, &config.capture_dir, config.partial_files)?;

        for path in &recovered.partial_admitted {
            logger.warn(&format!("Recovered partial segment {}", path.display()));
        }
        for path in &recovered.partial_discarded {
            logger.warn(&format!("Discarded partial segment {}", path.display()));
        }
        for failure in &recovered.failures {
            logger.warn(&format!(
                "Could not resolve partial segment {}: {}",
                failure.path.display(),
                failure.error
            ));
        }
        logger.info(&format!(
            "Recovered {} segments ({} bytes) from {}",
            recovered.ledger.len(),
            recovered.ledger.total_bytes(),
            config.capture_dir.display()
        ));

        let mut retention = RetentionManager::with_ledger(config.retention, recovered.ledger);
        let mut stats = SupervisorStats {
            files_discarded: recovered.partial_discarded.len() as u64,
            ..Default::default()
        };
        let report = retention.evict(&fs);
        record_evictions(&logger, &mut stats, &report);

        Ok(Self {
            config,
            launcher,
            fs,
            clock,
            logger,
            retention,
            state: SupervisorState {
                phase: Phase::Idle,
                active: None,
                consecutive_failures: 0,
                healthy_since: None,
                backoff_until: None,
                last_error: None,
                next_sequence: recovered.next_sequence,
                stats,
            },
            last_status_at: None,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> &SupervisorState<L::Session> {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    pub fn stats(&self) -> SupervisorStats {
        self.state.stats
    }

    /// Path of the segment being written, if any.
    pub fn active_file(&self) -> Option<&Path> {
        self.state.active.as_ref().map(|a| a.file.path.as_path())
    }

    pub fn ledger(&self) -> &RetentionLedger {
        self.retention.ledger()
    }

    pub fn summary(&self) -> SupervisorSummary {
        SupervisorSummary {
            stats: self.state.stats,
            retained_files: self.ledger().len(),
            retained_bytes: self.ledger().total_bytes(),
            last_error: self.state.last_error.clone(),
        }
    }

    /// Perform every transition due now.
    ///
    /// `rotate_requested` forces a rotation if a session is capturing.
    pub fn tick(&mut self, rotate_requested: bool) -> Result<Phase, SupervisorError> {
        if self.state.phase == Phase::Idle {
            self.state.phase = Phase::Starting;
        }

        if self.state.phase == Phase::Restarting {
            let now = self.clock.now_unix_sec();
            match self.state.backoff_until {
                Some(deadline) if now < deadline => return Ok(self.state.phase),
                _ => {
                    self.state.backoff_until = None;
                    self.state.phase = Phase::Starting;
                }
            }
        } else if rotate_requested && self.state.phase != Phase::Capturing {
            self.logger
                .debug(&format!("Ignoring rotate request in phase {}", self.state.phase));
        }

        if self.state.phase == Phase::Capturing {
            self.check_session(rotate_requested)?;
        }

        if self.state.phase == Phase::Rotating {
            self.rotate();
        }

        if self.state.phase == Phase::Starting {
            self.start_session()?;
        }

        Ok(self.state.phase)
    }

    /// Stop the active session, admit its segment, and enter `Stopped`.
    pub fn shutdown(&mut self) {
        if self.state.phase == Phase::Stopped {
            return;
        }
        self.state.phase = Phase::ShuttingDown;

        if let Some(mut active) = self.state.active.take() {
            self.logger.info(&format!(
                "Stopping capture session for {}",
                active.file.path.display()
            ));
            self.stop_session(&mut active);
            self.close_segment(active);
        }

        self.state.backoff_until = None;
        self.state.phase = Phase::Stopped;
        self.logger.info("Supervisor stopped");
    }

    /// Tick until shutdown is requested or the restart budget runs out.
    ///
    /// Sleeps one tick interval between ticks, or less while a backoff
    /// deadline is closer. On shutdown the final segment is admitted before
    /// returning.
    pub fn run<S, H, R>(
        &mut self,
        sleeper: &S,
        shutdown: &H,
        rotate: &R,
    ) -> Result<SupervisorSummary, SupervisorError>
    where
        S: Sleeper,
        H: ShutdownCheck,
        R: RotateRequest,
    {
        self.logger.info(&format!(
            "Supervising capture into {} (tick={}s)",
            self.config.capture_dir.display(),
            self.config.tick_interval_secs
        ));

        loop {
            if shutdown.should_stop() {
                self.logger.info("Shutdown requested");
                break;
            }

            if let Err(e) = self.tick(rotate.take_request()) {
                self.state.phase = Phase::Stopped;
                self.logger.error(&e.to_string());
                self.write_status(true);
                return Err(e);
            }
            self.write_status(false);

            sleeper.sleep_sec(self.next_wait_secs());
        }

        self.shutdown();
        self.write_status(true);
        Ok(self.summary())
    }

    /// Seconds to sleep before the next tick.
    pub fn next_wait_secs(&self) -> u64 {
        let tick = self.config.tick_interval_secs.max(1);
        match (self.state.phase, self.state.backoff_until) {
            (Phase::Restarting, Some(deadline)) => {
                let remaining = deadline.saturating_sub(self.clock.now_unix_sec());
                remaining.clamp(1, tick)
            }
            _ => tick,
        }
    }

    fn check_session(&mut self, rotate_requested: bool) -> Result<(), SupervisorError> {
        let now = self.clock.now_unix_sec();
        let Some(active) = self.state.active.as_mut() else {
            self.state.phase = Phase::Starting;
            return Ok(());
        };

        match active.session.poll() {
            Ok(SessionStatus::Running) => {
                active.last_healthy_at = now;
                if let Ok(size) = self.fs.file_size(&active.file.path) {
                    active.file.size_bytes = size;
                }
                let elapsed = now.saturating_sub(active.started_at);
                let healthy = self
                    .state
                    .healthy_since
                    .map_or(0, |since| now.saturating_sub(since));

                if self.state.consecutive_failures > 0 && healthy >= self.config.min_healthy_secs {
                    self.logger.info(&format!(
                        "Capture healthy for {}s, clearing {} consecutive failures",
                        healthy, self.state.consecutive_failures
                    ));
                    self.state.consecutive_failures = 0;
                }

                if rotate_requested {
                    self.logger.info("Rotation requested");
                    self.state.phase = Phase::Rotating;
                } else if self
                    .config
                    .rotation
                    .should_rotate(elapsed, active.file.size_bytes)
                {
                    self.logger.verbose(&format!(
                        "Rotating after {}s at {} bytes",
                        elapsed, active.file.size_bytes
                    ));
                    self.state.phase = Phase::Rotating;
                }
                Ok(())
            }
            Ok(status) if status.is_clean_exit() => {
                self.logger
                    .info("Capture session exited cleanly, starting a new segment");
                if let Some(active) = self.state.active.take() {
                    self.close_segment(active);
                }
                self.state.phase = Phase::Starting;
                Ok(())
            }
            Ok(status) => {
                if let Some(active) = self.state.active.take() {
                    self.close_segment(active);
                }
                self.fail(CaptureFailure::Crashed(status))
            }
            Err(e) => {
                if let Some(mut active) = self.state.active.take() {
                    self.stop_session(&mut active);
                    self.close_segment(active);
                }
                self.fail(CaptureFailure::Session(e))
            }
        }
    }

    fn rotate(&mut self) {
        if let Some(mut active) = self.state.active.take() {
            self.stop_session(&mut active);
            self.close_segment(active);
            self.state.stats.rotations += 1;
        }
        self.state.phase = Phase::Starting;
    }

    fn start_session(&mut self) -> Result<(), SupervisorError> {
        let now = self.clock.now_unix_sec();
        let name = CaptureName::new(now, self.state.next_sequence);
        self.state.next_sequence += 1;

        let dir = &self.config.capture_dir;
        let part_path = dir.join(name.partial_file_name());
        if let Err(source) = self
            .fs
            .create_dir_all(dir)
            .and_then(|_| self.fs.create_file(&part_path))
        {
            return self.fail(CaptureFailure::RotationIo {
                path: part_path,
                source,
            });
        }

        match self.launcher.start(&part_path) {
            Ok(session) => {
                self.logger
                    .info(&format!("Capture started: {}", part_path.display()));
                self.state.stats.sessions_started += 1;
                self.state.healthy_since.get_or_insert(now);
                self.state.active = Some(ActiveCapture {
                    session,
                    file: CaptureFile::open(part_path, name),
                    started_at: now,
                    last_healthy_at: now,
                });
                self.state.phase = Phase::Capturing;
                Ok(())
            }
            Err(e) => {
                if let Err(remove_err) = self.fs.remove(&part_path) {
                    self.logger.debug(&format!(
                        "Could not remove unused {}: {}",
                        part_path.display(),
                        remove_err
                    ));
                }
                self.fail(CaptureFailure::Launch(e))
            }
        }
    }

    fn stop_session(&self, active: &mut ActiveCapture<L::Session>) {
        match active.session.stop(self.config.grace_timeout) {
            Ok(status) => self
                .logger
                .debug(&format!("Capture session stopped: {}", status)),
            Err(e) => self
                .logger
                .warn(&format!("Error stopping capture session: {}", e)),
        }
    }

    /// Finalize a segment whose session is no longer running and hand it to
    /// retention. Empty segments are deleted.
    fn close_segment(&mut self, active: ActiveCapture<L::Session>) {
        let part_path = active.file.path;
        let name = active.file.name;

        let size = match self.fs.file_size(&part_path) {
            Ok(size) => size,
            Err(e) => {
                self.logger.warn(&format!(
                    "Capture file {} unreadable at close: {}",
                    part_path.display(),
                    e
                ));
                return;
            }
        };

        if size == 0 {
            self.logger
                .verbose(&format!("Discarding empty segment {}", part_path.display()));
            if let Err(e) = self.fs.remove(&part_path) {
                self.logger.warn(&format!(
                    "Failed to remove empty segment {}: {}",
                    part_path.display(),
                    e
                ));
            }
            self.state.stats.files_discarded += 1;
            return;
        }

        let final_path = finished_path(&self.config.capture_dir, &name);
        let path = match self.fs.rename(&part_path, &final_path) {
            Ok(()) => final_path,
            Err(e) => {
                self.logger.warn(&format!(
                    "Failed to finalize {}: {}; retaining under its partial name",
                    part_path.display(),
                    e
                ));
                part_path
            }
        };

        self.logger
            .info(&format!("Closed segment {} ({} bytes)", path.display(), size));
        match self
            .retention
            .admit(&self.fs, CaptureFile::closed(path, name, size))
        {
            Ok(report) => {
                self.state.stats.files_admitted += 1;
                record_evictions(&self.logger, &mut self.state.stats, &report);
            }
            Err(e) => self.logger.error(&e.to_string()),
        }
    }

    fn fail(&mut self, failure: CaptureFailure) -> Result<(), SupervisorError> {
        let now = self.clock.now_unix_sec();
        let message = failure.to_string();
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        self.state.healthy_since = None;
        self.state.last_error = Some(message.clone());
        let attempts = self.state.consecutive_failures;

        if let Some(max) = self.config.max_restarts {
            if attempts > max {
                self.state.phase = Phase::Stopped;
                return Err(SupervisorError::ExhaustedRetries {
                    attempts,
                    last_error: message,
                });
            }
        }

        let delay = self.config.backoff.delay_secs(attempts);
        self.state.backoff_until = Some(now.saturating_add(delay));
        self.state.stats.restarts += 1;
        self.state.phase = Phase::Restarting;
        self.logger.warn(&format!(
            "{} (failure {}), restarting in {}s",
            message, attempts, delay
        ));
        Ok(())
    }

    fn write_status(&mut self, force: bool) {
        let Some(path) = self.config.status_file.as_ref() else {
            return;
        };
        let now = self.clock.now_unix_sec();
        let due = match self.last_status_at {
            Some(last) => now.saturating_sub(last) >= self.config.status_interval_secs,
            None => true,
        };
        if !force && !due {
            return;
        }

        let line = StatusLine {
            timestamp: now,
            phase: self.state.phase,
            sessions_started: self.state.stats.sessions_started,
            restarts: self.state.stats.restarts,
            consecutive_failures: self.state.consecutive_failures,
            retained_files: self.ledger().len(),
            retained_bytes: self.ledger().total_bytes(),
            active_file: self.active_file().map(|p| p.display().to_string()),
            last_error: self.state.last_error.clone(),
        };
        if let Err(e) = StatusWriter::new(&self.fs, path.clone()).append(&line) {
            self.logger.warn(&e.to_string());
        }
        self.last_status_at = Some(now);
    }
}

fn record_evictions<G: Logger>(logger: &G, stats: &mut SupervisorStats, report: &EvictionReport) {
    for file in &report.evicted {
        logger.verbose(&format!(
            "Evicted {} ({} bytes)",
            file.path.display(),
            file.size_bytes
        ));
    }
    for failure in &report.failures {
        logger.warn(&format!(
            "Failed to delete evicted segment {}: {}",
            failure.path.display(),
            failure.error
        ));
    }
    stats.files_evicted += report.evicted_count() as u64;
    stats.eviction_failures += report.failures.len() as u64;
}
