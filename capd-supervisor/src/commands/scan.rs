//! Scan command.
//!
//! Prints the ledger a supervisor would recover from a capture directory,
//! one JSON line per segment followed by a totals line. Nothing on disk is
//! modified; leftover `.part` segments are listed but not resolved.

use std::io::Write;
use std::path::PathBuf;

use capd_fs::{scan_directory, Filesystem};
use serde::{Deserialize, Serialize};

use crate::cli::ScanArgs;

use super::CommandResult;

/// One segment in scan output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLine {
    pub path: PathBuf,
    pub created_unix_sec: u64,
    pub sequence: u64,
    pub size_bytes: u64,
    /// True for a leftover `.part` segment.
    pub partial: bool,
}

/// Final line of scan output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTotals {
    pub files: usize,
    pub bytes: u64,
    pub partial_files: usize,
    pub next_sequence: u64,
}

/// Result of scan command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub segments: Vec<ScanLine>,
    pub totals: ScanTotals,
}

/// Execute the scan command, writing JSON lines to `out`.
pub fn execute_scan<F, W>(args: &ScanArgs, fs: &F, out: &mut W) -> CommandResult<ScanResult>
where
    F: Filesystem,
    W: Write,
{
    let scan = scan_directory(fs, &args.capture_dir)?;

    let mut segments: Vec<ScanLine> = scan
        .ledger
        .iter()
        .map(|file| ScanLine {
            path: file.path.clone(),
            created_unix_sec: file.name.created_unix_sec,
            sequence: file.name.sequence,
            size_bytes: file.size_bytes,
            partial: false,
        })
        .collect();
    segments.extend(scan.partial.iter().map(|entry| ScanLine {
        path: entry.path.clone(),
        created_unix_sec: entry.name.created_unix_sec,
        sequence: entry.name.sequence,
        size_bytes: entry.size_bytes,
        partial: true,
    }));

    let totals = ScanTotals {
        files: scan.ledger.len(),
        bytes: scan.ledger.total_bytes(),
        partial_files: scan.partial.len(),
        next_sequence: scan.next_sequence,
    };

    for line in &segments {
        writeln!(out, "{}", to_json(line))?;
    }
    writeln!(out, "{}", to_json(&totals))?;

    Ok(ScanResult { segments, totals })
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("scan output serialization should never fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use capd_fs::{CaptureName, MockFilesystem};

    fn dir() -> PathBuf {
        PathBuf::from("/captures")
    }

    fn args() -> ScanArgs {
        ScanArgs {
            capture_dir: dir(),
        }
    }

    #[test]
    fn test_scan_lists_segments_and_totals() {
        let fs = MockFilesystem::new();
        fs.add_file(dir().join(CaptureName::new(2000, 2).file_name()), 300);
        fs.add_file(dir().join(CaptureName::new(1000, 1).file_name()), 100);
        fs.add_file(dir().join(CaptureName::new(3000, 3).partial_file_name()), 50);
        fs.add_file(dir().join("notes.txt"), 10);

        let mut out = Vec::new();
        let result = execute_scan(&args(), &fs, &mut out).expect("scan");

        assert_eq!(result.segments.len(), 3);
        assert_eq!(result.segments[0].sequence, 1);
        assert_eq!(result.segments[1].sequence, 2);
        assert!(result.segments[2].partial);
        assert_eq!(
            result.totals,
            ScanTotals {
                files: 2,
                bytes: 400,
                partial_files: 1,
                next_sequence: 4,
            }
        );

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        let first: ScanLine = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.size_bytes, 100);
        let totals: ScanTotals = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(totals.bytes, 400);
    }

    #[test]
    fn test_scan_does_not_modify() {
        let fs = MockFilesystem::new();
        let partial = dir().join(CaptureName::new(3000, 3).partial_file_name());
        fs.add_file(partial.clone(), 0);

        let mut out = Vec::new();
        execute_scan(&args(), &fs, &mut out).expect("scan");

        assert_eq!(fs.paths(), vec![partial]);
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let fs = MockFilesystem::new();
        let mut out = Vec::new();
        let result = execute_scan(&args(), &fs, &mut out).expect("scan");

        assert!(result.segments.is_empty());
        assert_eq!(result.totals.next_sequence, 1);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
