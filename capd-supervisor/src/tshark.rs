//! tshark-backed capture launcher.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::session::{CaptureLauncher, LaunchError, ProcessSession};

/// Default capture binary.
pub const DEFAULT_CAPTURE_BINARY: &str = "tshark";

/// Default capture interface (all interfaces).
pub const DEFAULT_INTERFACE: &str = "any";

/// How to invoke the capture tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsharkConfig {
    pub binary: PathBuf,
    pub interface: String,
    /// BPF capture filter passed with `-f`.
    pub capture_filter: Option<String>,
    /// Appended verbatim after the standard arguments.
    pub extra_args: Vec<String>,
}

impl Default for TsharkConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_CAPTURE_BINARY),
            interface: DEFAULT_INTERFACE.to_string(),
            capture_filter: None,
            extra_args: Vec::new(),
        }
    }
}

impl TsharkConfig {
    /// Arguments for a capture writing to `output`.
    pub fn command_args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            self.interface.clone().into(),
            "-w".into(),
            output.as_os_str().to_os_string(),
            "-q".into(),
        ];
        if let Some(filter) = &self.capture_filter {
            args.push("-f".into());
            args.push(filter.clone().into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

/// Launches tshark as a [`ProcessSession`].
#[derive(Debug, Clone, Default)]
pub struct TsharkLauncher {
    config: TsharkConfig,
}

impl TsharkLauncher {
    pub fn new(config: TsharkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TsharkConfig {
        &self.config
    }

    fn command(&self, output: &Path) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .args(self.config.command_args(output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        command
    }
}

impl CaptureLauncher for TsharkLauncher {
    type Session = ProcessSession;

    fn start(&self, output: &Path) -> Result<ProcessSession, LaunchError> {
        ProcessSession::spawn(self.command(output), output)
    }
}
