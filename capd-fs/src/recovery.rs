//! Startup recovery: rebuild the retention ledger from the capture directory.
//!
//! Capture files are the only persisted state. After a restart the ledger is
//! reconstructed by scanning the directory; names give the order, metadata
//! gives the sizes. Leftover `.part` files come from a supervisor that did not
//! shut down cleanly and are handled per [`PartialFilePolicy`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::naming::CaptureName;
use crate::retention::{CaptureFile, RetentionLedger};
use crate::store::{CaptureEntry, Filesystem, FsError};

/// What to do with segments left in `.part` state by an unclean shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialFilePolicy {
    /// Rename to the final name and keep as a closed segment.
    #[default]
    Admit,
    /// Delete.
    Discard,
}

impl FromStr for PartialFilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admit" => Ok(Self::Admit),
            "discard" => Ok(Self::Discard),
            other => Err(format!("expected 'admit' or 'discard', got '{}'", other)),
        }
    }
}

impl fmt::Display for PartialFilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admit => f.write_str("admit"),
            Self::Discard => f.write_str("discard"),
        }
    }
}

/// Read-only view of a capture directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScan {
    /// Finished segments as a ledger.
    pub ledger: RetentionLedger,

    /// Leftover segments still carrying `.part`.
    pub partial: Vec<CaptureEntry>,

    /// First sequence number not used by any segment on disk.
    pub next_sequence: u64,
}

/// A leftover partial segment that could not be resolved.
///
/// Non-fatal: recovery carries on with the remaining entries.
#[derive(Debug)]
pub struct RecoveryFailure {
    pub path: PathBuf,
    pub error: FsError,
}

/// Result of recovering a capture directory.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub ledger: RetentionLedger,
    pub next_sequence: u64,
    /// Partial segments renamed into the ledger.
    pub partial_admitted: Vec<PathBuf>,
    /// Partial segments deleted (by policy, or because they were empty).
    pub partial_discarded: Vec<PathBuf>,
    /// Partial segments whose removal or rename failed.
    pub failures: Vec<RecoveryFailure>,
}

/// Scan `dir` without modifying it.
pub fn scan_directory<F: Filesystem>(fs: &F, dir: &Path) -> Result<DirectoryScan, FsError> {
    let mut scan = DirectoryScan {
        next_sequence: 1,
        ..Default::default()
    };

    for entry in fs.list_captures(dir)? {
        scan.next_sequence = scan.next_sequence.max(entry.name.sequence.saturating_add(1));
        if entry.partial {
            scan.partial.push(entry);
        } else {
            scan.ledger.insert(CaptureFile::closed(
                entry.path,
                entry.name,
                entry.size_bytes,
            ));
        }
    }

    Ok(scan)
}

/// Path of the finished segment for `name` inside `dir`.
pub fn finished_path(dir: &Path, name: &CaptureName) -> PathBuf {
    dir.join(name.file_name())
}

/// Rebuild the ledger for `dir`, resolving leftover partial segments.
///
/// Running it again on an unchanged directory yields the same ledger. Only
/// the directory listing is fatal. A partial segment that cannot be deleted
/// is left untracked, and one that cannot be renamed is tracked under its
/// `.part` path so its bytes still count against the budget.
pub fn recover_ledger<F: Filesystem>(
    fs: &F,
    dir: &Path,
    policy: PartialFilePolicy,
) -> Result<RecoveryReport, FsError> {
    let scan = scan_directory(fs, dir)?;
    let mut report = RecoveryReport {
        ledger: scan.ledger,
        next_sequence: scan.next_sequence,
        ..Default::default()
    };

    for entry in scan.partial {
        if policy == PartialFilePolicy::Discard || entry.size_bytes == 0 {
            match fs.remove(&entry.path) {
                Ok(()) => report.partial_discarded.push(entry.path),
                Err(error) => report.failures.push(RecoveryFailure {
                    path: entry.path,
                    error,
                }),
            }
            continue;
        }

        let target = finished_path(dir, &entry.name);
        let path = match fs.rename(&entry.path, &target) {
            Ok(()) => {
                report.partial_admitted.push(target.clone());
                target
            }
            Err(error) => {
                report.failures.push(RecoveryFailure {
                    path: entry.path.clone(),
                    error,
                });
                entry.path
            }
        };
        report.ledger.insert(CaptureFile::closed(
            path,
            entry.name,
            entry.size_bytes,
        ));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::{RetentionConfig, RetentionManager};
    use crate::store::{MockFilesystem, RealFilesystem};
    use tempfile::tempdir;

    fn dir() -> PathBuf {
        PathBuf::from("/captures")
    }

    fn add(fs: &MockFilesystem, ts: u64, seq: u64, size: u64) -> PathBuf {
        let path = dir().join(CaptureName::new(ts, seq).file_name());
        fs.add_file(path.clone(), size);
        path
    }

    fn add_partial(fs: &MockFilesystem, ts: u64, seq: u64, size: u64) -> PathBuf {
        let path = dir().join(CaptureName::new(ts, seq).partial_file_name());
        fs.add_file(path.clone(), size);
        path
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!("admit".parse::<PartialFilePolicy>(), Ok(PartialFilePolicy::Admit));
        assert_eq!("discard".parse::<PartialFilePolicy>(), Ok(PartialFilePolicy::Discard));
        assert!("keep".parse::<PartialFilePolicy>().is_err());
        assert_eq!(PartialFilePolicy::default().to_string(), "admit");
    }

    #[test]
    fn test_scan_empty_directory() {
        let fs = MockFilesystem::new();
        let scan = scan_directory(&fs, &dir()).expect("scan");
        assert!(scan.ledger.is_empty());
        assert!(scan.partial.is_empty());
        assert_eq!(scan.next_sequence, 1);
    }

    #[test]
    fn test_scan_builds_ordered_ledger() {
        let fs = MockFilesystem::new();
        add(&fs, 3000, 3, 30);
        add(&fs, 1000, 1, 10);
        add(&fs, 2000, 2, 20);

        let scan = scan_directory(&fs, &dir()).expect("scan");

        let order: Vec<u64> = scan.ledger.iter().map(|f| f.name.sequence).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(scan.ledger.total_bytes(), 60);
        assert_eq!(scan.next_sequence, 4);
    }

    #[test]
    fn test_scan_does_not_modify_partials() {
        let fs = MockFilesystem::new();
        add(&fs, 1000, 1, 10);
        let partial = add_partial(&fs, 2000, 9, 5);

        let scan = scan_directory(&fs, &dir()).expect("scan");

        assert_eq!(scan.ledger.len(), 1);
        assert_eq!(scan.partial.len(), 1);
        assert_eq!(scan.next_sequence, 10);
        assert!(fs.exists(&partial));
    }

    #[test]
    fn test_recover_admits_partial_by_default() {
        let fs = MockFilesystem::new();
        add(&fs, 1000, 1, 10);
        let partial = add_partial(&fs, 2000, 2, 5);

        let report = recover_ledger(&fs, &dir(), PartialFilePolicy::Admit).expect("recover");

        let target = dir().join(CaptureName::new(2000, 2).file_name());
        assert_eq!(report.partial_admitted, vec![target.clone()]);
        assert!(!fs.exists(&partial));
        assert_eq!(fs.size_of(&target), Some(5));
        assert_eq!(report.ledger.len(), 2);
        assert_eq!(report.ledger.total_bytes(), 15);
        assert_eq!(report.next_sequence, 3);
    }

    #[test]
    fn test_recover_discards_partial() {
        let fs = MockFilesystem::new();
        add(&fs, 1000, 1, 10);
        let partial = add_partial(&fs, 2000, 2, 5);

        let report = recover_ledger(&fs, &dir(), PartialFilePolicy::Discard).expect("recover");

        assert_eq!(report.partial_discarded, vec![partial.clone()]);
        assert!(!fs.exists(&partial));
        assert_eq!(report.ledger.len(), 1);
        assert_eq!(report.next_sequence, 3);
    }

    #[test]
    fn test_recover_drops_empty_partial_even_when_admitting() {
        let fs = MockFilesystem::new();
        let partial = add_partial(&fs, 2000, 2, 0);

        let report = recover_ledger(&fs, &dir(), PartialFilePolicy::Admit).expect("recover");

        assert!(report.ledger.is_empty());
        assert_eq!(report.partial_discarded, vec![partial]);
    }

    #[test]
    fn test_recover_skips_partial_that_cannot_be_removed() {
        let fs = MockFilesystem::new();
        add(&fs, 1000, 1, 10);
        let locked = add_partial(&fs, 2000, 2, 5);
        let other = add_partial(&fs, 3000, 3, 7);
        fs.fail_removal_of(locked.clone());

        let report = recover_ledger(&fs, &dir(), PartialFilePolicy::Discard).expect("recover");

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, locked);
        assert_eq!(report.partial_discarded, vec![other.clone()]);
        assert!(fs.exists(&locked));
        assert!(!fs.exists(&other));
        assert_eq!(report.ledger.len(), 1);
        assert_eq!(report.next_sequence, 4);
    }

    #[test]
    fn test_recover_keeps_partial_name_when_rename_fails() {
        let fs = MockFilesystem::new();
        let stuck = add_partial(&fs, 2000, 2, 5);
        let fine = add_partial(&fs, 3000, 3, 7);
        fs.fail_rename_of(stuck.clone());

        let report = recover_ledger(&fs, &dir(), PartialFilePolicy::Admit).expect("recover");

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, stuck);
        assert_eq!(
            report.partial_admitted,
            vec![dir().join(CaptureName::new(3000, 3).file_name())]
        );
        let paths: Vec<&PathBuf> = report.ledger.iter().map(|f| &f.path).collect();
        assert!(paths.contains(&&stuck));
        assert_eq!(report.ledger.total_bytes(), 12);
        assert!(!fs.exists(&fine));
    }

    #[test]
    fn test_recover_is_idempotent() {
        let fs = MockFilesystem::new();
        add(&fs, 1000, 1, 10);
        add(&fs, 1000, 2, 11);
        add(&fs, 2000, 3, 12);
        add_partial(&fs, 3000, 4, 13);

        let first = recover_ledger(&fs, &dir(), PartialFilePolicy::Admit).expect("first");
        let second = recover_ledger(&fs, &dir(), PartialFilePolicy::Admit).expect("second");

        assert_eq!(first.ledger, second.ledger);
        assert_eq!(first.next_sequence, second.next_sequence);
        assert!(second.partial_admitted.is_empty());
    }

    #[test]
    fn test_recovered_ledger_matches_in_memory_ledger() {
        let fs = MockFilesystem::new();
        let mut manager = RetentionManager::new(RetentionConfig::new(50, 0));

        for (ts, seq, size) in [(1000, 1, 20), (2000, 2, 20), (3000, 3, 20), (3000, 4, 5)] {
            let path = add(&fs, ts, seq, size);
            let file = CaptureFile::closed(path, CaptureName::new(ts, seq), size);
            manager.admit(&fs, file).expect("admit");
        }

        let recovered = recover_ledger(&fs, &dir(), PartialFilePolicy::Admit).expect("recover");

        assert_eq!(&recovered.ledger, manager.ledger());
    }

    #[test]
    fn test_recover_real_directory() {
        let tmp = tempdir().expect("tempdir");
        let fs = RealFilesystem;
        let done = tmp.path().join(CaptureName::new(1704067200, 1).file_name());
        let part = tmp
            .path()
            .join(CaptureName::new(1704067260, 2).partial_file_name());
        std::fs::write(&done, vec![1u8; 64]).unwrap();
        std::fs::write(&part, vec![1u8; 32]).unwrap();

        let report = recover_ledger(&fs, tmp.path(), PartialFilePolicy::Admit).expect("recover");

        assert_eq!(report.ledger.len(), 2);
        assert_eq!(report.ledger.total_bytes(), 96);
        assert!(!part.exists());
        assert!(tmp
            .path()
            .join(CaptureName::new(1704067260, 2).file_name())
            .exists());

        let again = recover_ledger(&fs, tmp.path(), PartialFilePolicy::Admit).expect("again");
        assert_eq!(again.ledger, report.ledger);
    }
}
