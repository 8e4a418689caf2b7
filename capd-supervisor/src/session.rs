//! Capture session abstraction.
//!
//! A capture session is one run of the external packet-capture subprocess
//! writing to one output file. The supervisor only needs three operations
//! from it: start, non-blocking poll, and bounded stop. They are expressed as
//! [`CaptureLauncher`] and [`CaptureSession`] so the control loop can run
//! against a scripted fake.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Interval between exit checks while waiting for a graceful stop.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Observed state of a capture subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Still capturing.
    Running,
    /// Exited with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Crashed(i32),
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    /// True for `Exited(0)`.
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, SessionStatus::Exited(0))
    }

    /// True for a non-zero exit or a signal.
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionStatus::Exited(code) if *code != 0)
            || matches!(self, SessionStatus::Crashed(_))
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Exited(code) => write!(f, "exited with status {}", code),
            SessionStatus::Crashed(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}

/// The capture subprocess could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("capture binary not found: {}", binary.display())]
    NotFound { binary: PathBuf },

    #[error("permission denied launching {} (raw capture privilege missing?)", binary.display())]
    PermissionDenied { binary: PathBuf },

    #[error("failed to spawn {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Classify a spawn failure.
    pub fn from_spawn(binary: &Path, source: io::Error) -> Self {
        let binary = binary.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => LaunchError::NotFound { binary },
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied { binary },
            _ => LaunchError::Spawn { binary, source },
        }
    }
}

/// Failure while observing or stopping a running session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to query capture process: {0}")]
    Io(#[from] io::Error),
}

/// Starts capture sessions.
pub trait CaptureLauncher {
    type Session: CaptureSession;

    /// Launch the capture subprocess writing to `output`.
    fn start(&self, output: &Path) -> Result<Self::Session, LaunchError>;
}

/// One supervised run of the capture subprocess.
pub trait CaptureSession {
    /// Non-blocking status check. Once the process has exited the same
    /// status is returned on every call.
    fn poll(&mut self) -> Result<SessionStatus, SessionError>;

    /// Request termination and wait up to `grace` for a clean exit, then
    /// force-kill. The output file is complete once this returns.
    fn stop(&mut self, grace: Duration) -> Result<SessionStatus, SessionError>;

    /// Path the subprocess writes to.
    fn output_path(&self) -> &Path;
}

/// Map a process exit status onto [`SessionStatus`].
pub fn status_from_exit(status: ExitStatus) -> SessionStatus {
    if let Some(code) = status.code() {
        return SessionStatus::Exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SessionStatus::Crashed(signal);
        }
    }

    SessionStatus::Crashed(-1)
}

/// A capture session backed by an OS child process.
#[derive(Debug)]
pub struct ProcessSession {
    child: Child,
    output: PathBuf,
    finished: Option<SessionStatus>,
}

impl ProcessSession {
    /// Spawn `command` as a session writing to `output`.
    pub fn spawn(mut command: Command, output: &Path) -> Result<Self, LaunchError> {
        let binary = PathBuf::from(command.get_program());
        let child = command
            .spawn()
            .map_err(|e| LaunchError::from_spawn(&binary, e))?;
        Ok(Self {
            child,
            output: output.to_path_buf(),
            finished: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn request_termination(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: kill(2) with a pid we spawned and have not yet reaped.
            unsafe {
                let _ = libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }
    }
}

impl CaptureSession for ProcessSession {
    fn poll(&mut self) -> Result<SessionStatus, SessionError> {
        if let Some(status) = self.finished {
            return Ok(status);
        }
        match self.child.try_wait()? {
            Some(exit) => {
                let status = status_from_exit(exit);
                self.finished = Some(status);
                Ok(status)
            }
            None => Ok(SessionStatus::Running),
        }
    }

    fn stop(&mut self, grace: Duration) -> Result<SessionStatus, SessionError> {
        if let Some(status) = self.finished {
            return Ok(status);
        }

        self.request_termination();

        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(exit) = self.child.try_wait()? {
                let status = status_from_exit(exit);
                self.finished = Some(status);
                return Ok(status);
            }
            thread::sleep(STOP_POLL_INTERVAL.min(grace.saturating_sub(start.elapsed())));
        }

        let _ = self.child.kill();
        let status = status_from_exit(self.child.wait()?);
        self.finished = Some(status);
        Ok(status)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if self.finished.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[test]
    fn test_status_predicates() {
        assert!(SessionStatus::Running.is_running());
        assert!(SessionStatus::Exited(0).is_clean_exit());
        assert!(!SessionStatus::Exited(0).is_failure());
        assert!(SessionStatus::Exited(2).is_failure());
        assert!(SessionStatus::Crashed(9).is_failure());
        assert!(!SessionStatus::Running.is_failure());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Exited(2).to_string(), "exited with status 2");
        assert_eq!(SessionStatus::Crashed(11).to_string(), "killed by signal 11");
    }

    #[test]
    fn test_launch_error_classification() {
        let bin = Path::new("/usr/bin/tshark");
        let nf = LaunchError::from_spawn(bin, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(nf, LaunchError::NotFound { .. }));
        let pd = LaunchError::from_spawn(bin, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(pd, LaunchError::PermissionDenied { .. }));
        assert!(pd.to_string().contains("privilege"));
        let other = LaunchError::from_spawn(bin, io::Error::from(io::ErrorKind::Other));
        assert!(matches!(other, LaunchError::Spawn { .. }));
    }

    #[test]
    fn test_spawn_missing_binary() {
        let command = Command::new("/nonexistent/capd-test-binary");
        let err = ProcessSession::spawn(command, Path::new("/tmp/out")).unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    #[cfg(unix)]
    fn wait_for_exit(session: &mut ProcessSession) -> SessionStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = session.poll().expect("poll");
            if !status.is_running() || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_poll_reports_exit_code_repeatedly() {
        let mut session = ProcessSession::spawn(sh("exit 3"), Path::new("/tmp/out")).expect("spawn");
        assert_eq!(wait_for_exit(&mut session), SessionStatus::Exited(3));
        assert_eq!(session.poll().expect("poll"), SessionStatus::Exited(3));
        assert_eq!(session.stop(Duration::from_secs(1)).expect("stop"), SessionStatus::Exited(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_graceful_sigterm() {
        let mut session =
            ProcessSession::spawn(sh("trap 'exit 0' TERM; while :; do sleep 0.05; done"), Path::new("/tmp/out"))
                .expect("spawn");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(session.poll().expect("poll"), SessionStatus::Running);

        let status = session.stop(Duration::from_secs(5)).expect("stop");
        assert_eq!(status, SessionStatus::Exited(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_force_kills_unresponsive_process() {
        let mut session =
            ProcessSession::spawn(sh("trap '' TERM; while :; do sleep 0.05; done"), Path::new("/tmp/out"))
                .expect("spawn");
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        let status = session.stop(Duration::from_millis(200)).expect("stop");
        assert_eq!(status, SessionStatus::Crashed(libc::SIGKILL));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_path() {
        let mut session = ProcessSession::spawn(sh("exit 0"), Path::new("/tmp/capture.part")).expect("spawn");
        assert_eq!(session.output_path(), Path::new("/tmp/capture.part"));
        wait_for_exit(&mut session);
    }
}
