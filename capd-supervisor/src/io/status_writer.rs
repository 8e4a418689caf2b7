//! Status writer for append-only status.jsonl output.
//!
//! Writes periodic heartbeat lines describing the supervisor:
//! - One JSON line per status interval
//! - Append-only (survives restarts)
//! - Machine-readable status for monitoring

use std::path::{Path, PathBuf};

use capd_fs::{Filesystem, FsError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::supervisor::Phase;

/// Errors from status writing.
#[derive(Debug, Error)]
pub enum StatusWriterError {
    #[error("failed to append status: {0}")]
    Append(#[source] FsError),
}

/// A single heartbeat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    /// Unix epoch seconds when the line was written.
    pub timestamp: u64,

    pub phase: Phase,

    /// Sessions successfully launched since startup.
    pub sessions_started: u64,

    /// Failures that led to a restart since startup.
    pub restarts: u64,

    pub consecutive_failures: u32,

    /// Closed files currently retained.
    pub retained_files: usize,

    /// Bytes currently retained across closed files.
    pub retained_bytes: u64,

    /// File being written, if a session is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StatusLine {
    /// Serialize to JSON line (no trailing newline).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("StatusLine serialization should never fail")
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Writer for append-only status.jsonl file.
pub struct StatusWriter<F: Filesystem> {
    fs: F,
    path: PathBuf,
}

impl<F: Filesystem> StatusWriter<F> {
    pub fn new(fs: F, path: PathBuf) -> Self {
        Self { fs, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a status line to the file.
    ///
    /// Each line is a JSON object followed by a newline.
    /// The file is created if it doesn't exist.
    pub fn append(&self, status: &StatusLine) -> Result<(), StatusWriterError> {
        let line = format!("{}\n", status.to_json());
        self.fs
            .append(&self.path, line.as_bytes())
            .map_err(StatusWriterError::Append)
    }
}
