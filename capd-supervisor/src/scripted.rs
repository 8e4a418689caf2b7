//! Scripted capture launcher for deterministic testing.
//!
//! Each call to `start` consumes the next [`LaunchScript`]. Sessions replay a
//! list of poll results and, when given a [`MockFilesystem`], grow their
//! output file on every `Running` poll as a real capture would.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capd_fs::MockFilesystem;

use crate::session::{CaptureLauncher, CaptureSession, LaunchError, SessionError, SessionStatus};

/// Behavior of one session once launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScript {
    /// Results of successive polls. When exhausted the session keeps running.
    pub polls: Vec<SessionStatus>,
    /// Bytes appended to the output file per `Running` poll.
    pub bytes_per_poll: u64,
    /// Status reported when stopped while still running.
    pub stop_status: SessionStatus,
}

impl SessionScript {
    /// A session that runs until stopped.
    pub fn running() -> Self {
        Self {
            polls: Vec::new(),
            bytes_per_poll: 0,
            stop_status: SessionStatus::Exited(0),
        }
    }

    /// A session that reports `Running` for `polls` polls, then `status`.
    pub fn ending_after(polls: usize, status: SessionStatus) -> Self {
        let mut script = Self::running();
        script.polls = vec![SessionStatus::Running; polls];
        script.polls.push(status);
        script
    }

    pub fn writing(mut self, bytes_per_poll: u64) -> Self {
        self.bytes_per_poll = bytes_per_poll;
        self
    }

    pub fn stopping_with(mut self, status: SessionStatus) -> Self {
        self.stop_status = status;
        self
    }
}

/// Outcome of one `start` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchScript {
    Run(SessionScript),
    NotFound,
    PermissionDenied,
}

#[derive(Debug, Default)]
struct Record {
    attempts: Vec<PathBuf>,
    stops: Vec<PathBuf>,
}

/// Launcher that replays [`LaunchScript`]s in order.
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    scripts: Arc<Mutex<VecDeque<LaunchScript>>>,
    fallback: SessionScript,
    fs: Option<MockFilesystem>,
    record: Arc<Mutex<Record>>,
}

impl ScriptedLauncher {
    /// Play `scripts` in order, then launch [`SessionScript::running`] sessions.
    pub fn new(scripts: Vec<LaunchScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            fallback: SessionScript::running(),
            fs: None,
            record: Arc::new(Mutex::new(Record::default())),
        }
    }

    /// Session used once the scripts run out.
    pub fn with_fallback(mut self, fallback: SessionScript) -> Self {
        self.fallback = fallback;
        self
    }

    /// Grow output files in `fs` while sessions run.
    pub fn with_filesystem(mut self, fs: MockFilesystem) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Output paths of every `start` call, successful or not.
    pub fn attempts(&self) -> Vec<PathBuf> {
        self.record.lock().unwrap().attempts.clone()
    }

    /// Output paths of sessions that were stopped while running.
    pub fn stops(&self) -> Vec<PathBuf> {
        self.record.lock().unwrap().stops.clone()
    }
}

impl CaptureLauncher for ScriptedLauncher {
    type Session = ScriptedSession;

    fn start(&self, output: &Path) -> Result<ScriptedSession, LaunchError> {
        self.record
            .lock()
            .unwrap()
            .attempts
            .push(output.to_path_buf());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| LaunchScript::Run(self.fallback.clone()));

        let binary = PathBuf::from("scripted-capture");
        match script {
            LaunchScript::NotFound => Err(LaunchError::NotFound { binary }),
            LaunchScript::PermissionDenied => Err(LaunchError::PermissionDenied { binary }),
            LaunchScript::Run(script) => Ok(ScriptedSession {
                script,
                polls_done: 0,
                output: output.to_path_buf(),
                finished: None,
                fs: self.fs.clone(),
                record: self.record.clone(),
            }),
        }
    }
}

/// Session produced by [`ScriptedLauncher`].
#[derive(Debug)]
pub struct ScriptedSession {
    script: SessionScript,
    polls_done: usize,
    output: PathBuf,
    finished: Option<SessionStatus>,
    fs: Option<MockFilesystem>,
    record: Arc<Mutex<Record>>,
}

impl CaptureSession for ScriptedSession {
    fn poll(&mut self) -> Result<SessionStatus, SessionError> {
        if let Some(status) = self.finished {
            return Ok(status);
        }

        let status = self
            .script
            .polls
            .get(self.polls_done)
            .copied()
            .unwrap_or(SessionStatus::Running);
        self.polls_done += 1;

        if status.is_running() {
            if let Some(fs) = &self.fs {
                let current = fs.size_of(&self.output).unwrap_or(0);
                fs.set_size(&self.output, current + self.script.bytes_per_poll);
            }
        } else {
            self.finished = Some(status);
        }
        Ok(status)
    }

    fn stop(&mut self, _grace: Duration) -> Result<SessionStatus, SessionError> {
        if let Some(status) = self.finished {
            return Ok(status);
        }
        self.record.lock().unwrap().stops.push(self.output.clone());
        self.finished = Some(self.script.stop_status);
        Ok(self.script.stop_status)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}
