//! Capture directory storage for capd.
//!
//! This crate provides:
//! - The capture segment naming scheme
//! - Filesystem trait with real and mock implementations
//! - Retention ledger and budget-driven eviction
//! - Startup recovery of the ledger from the directory contents

pub mod naming;
pub mod recovery;
pub mod retention;
pub mod store;

pub use naming::{parse_capture_path, CaptureName, ParsedCaptureName};
pub use recovery::{
    finished_path, recover_ledger, scan_directory, DirectoryScan, PartialFilePolicy,
    RecoveryFailure, RecoveryReport,
};
pub use retention::{
    CaptureFile, EvictionFailure, EvictionReport, FileState, RetentionConfig, RetentionError,
    RetentionLedger, RetentionManager,
};
pub use store::{CaptureEntry, Filesystem, FsError, MockFilesystem, RealFilesystem};
