//! IO helpers for the supervisor.
//!
//! Provides the append-only status heartbeat writer.

pub mod status_writer;

pub use status_writer::{StatusLine, StatusWriter, StatusWriterError};
