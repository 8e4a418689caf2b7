//! Capture file naming scheme.
//!
//! Segment files are named `capture_<YYYYMMDD>T<HHMMSS>Z_<seq>.pcapng`, with a
//! trailing `.part` while the capture subprocess is still writing. The UTC
//! timestamp plus a zero-padded sequence number keep names unique and make
//! lexicographic order match chronological order.

use std::path::Path;

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Prefix shared by every capture segment.
pub const CAPTURE_PREFIX: &str = "capture_";

/// Extension of a finished capture segment.
pub const CAPTURE_EXTENSION: &str = "pcapng";

/// Extra extension carried by a segment that is still being written.
pub const PARTIAL_EXTENSION: &str = "part";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Identity of one capture segment: when it was created and its sequence number.
///
/// Ordering is by creation time first, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaptureName {
    pub created_unix_sec: u64,
    pub sequence: u64,
}

impl CaptureName {
    pub fn new(created_unix_sec: u64, sequence: u64) -> Self {
        Self {
            created_unix_sec,
            sequence,
        }
    }

    /// File name of the finished segment.
    pub fn file_name(&self) -> String {
        let ts = Utc
            .timestamp_opt(self.created_unix_sec as i64, 0)
            .single()
            .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| self.created_unix_sec.to_string());
        format!(
            "{}{}_{:06}.{}",
            CAPTURE_PREFIX, ts, self.sequence, CAPTURE_EXTENSION
        )
    }

    /// File name used while the segment is being written.
    pub fn partial_file_name(&self) -> String {
        format!("{}.{}", self.file_name(), PARTIAL_EXTENSION)
    }
}

/// A capture file name recognized on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCaptureName {
    pub name: CaptureName,
    /// True when the file still carries the `.part` extension.
    pub partial: bool,
}

/// Parse a capture segment path.
///
/// Returns `None` for anything that does not follow the naming scheme, so
/// foreign files in the capture directory are ignored.
pub fn parse_capture_path(path: &Path) -> Option<ParsedCaptureName> {
    let file_name = path.file_name()?.to_str()?;

    let (base, partial) = match file_name.strip_suffix(&format!(".{}", PARTIAL_EXTENSION)) {
        Some(base) => (base, true),
        None => (file_name, false),
    };

    let stem = base
        .strip_suffix(&format!(".{}", CAPTURE_EXTENSION))?
        .strip_prefix(CAPTURE_PREFIX)?;

    let (ts_str, seq_str) = stem.split_once('_')?;
    if seq_str.is_empty() || !seq_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence: u64 = seq_str.parse().ok()?;

    let created = NaiveDateTime::parse_from_str(ts_str, TIMESTAMP_FORMAT)
        .ok()?
        .and_utc()
        .timestamp();
    let created_unix_sec = u64::try_from(created).ok()?;

    Some(ParsedCaptureName {
        name: CaptureName::new(created_unix_sec, sequence),
        partial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_file_name_format() {
        // 1704067200 = 2024-01-01 00:00:00 UTC
        let name = CaptureName::new(1704067200, 1);
        assert_eq!(name.file_name(), "capture_20240101T000000Z_000001.pcapng");
    }

    #[test]
    fn test_partial_file_name_format() {
        let name = CaptureName::new(1704067200, 42);
        assert_eq!(
            name.partial_file_name(),
            "capture_20240101T000000Z_000042.pcapng.part"
        );
    }

    #[test]
    fn test_sequence_wider_than_padding() {
        let name = CaptureName::new(0, 1_234_567);
        assert_eq!(name.file_name(), "capture_19700101T000000Z_1234567.pcapng");
        let parsed = parse_capture_path(Path::new(&name.file_name())).expect("parse");
        assert_eq!(parsed.name, name);
    }

    #[test]
    fn test_parse_finished_name() {
        let path = PathBuf::from("/captures/capture_20240101T000130Z_000007.pcapng");
        let parsed = parse_capture_path(&path).expect("parse");
        assert_eq!(parsed.name, CaptureName::new(1704067290, 7));
        assert!(!parsed.partial);
    }

    #[test]
    fn test_parse_partial_name() {
        let path = PathBuf::from("capture_20240101T000000Z_000003.pcapng.part");
        let parsed = parse_capture_path(&path).expect("parse");
        assert_eq!(parsed.name, CaptureName::new(1704067200, 3));
        assert!(parsed.partial);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        for name in [
            "status.jsonl",
            "capture_20240101T000000Z_000001.pcap",
            "cap_20240101_00.pcapng",
            "capture_20240101T000000Z.pcapng",
            "capture_20240101T000000Z_.pcapng",
            "capture_20240101T000000Z_00a1.pcapng",
            "capture_20241301T000000Z_000001.pcapng",
            "capture_garbage_000001.pcapng",
        ] {
            assert_eq!(parse_capture_path(Path::new(name)), None, "{}", name);
        }
    }

    #[test]
    fn test_names_sort_chronologically() {
        let a = CaptureName::new(1704067200, 9);
        let b = CaptureName::new(1704067201, 1);
        let c = CaptureName::new(1704067201, 2);
        assert!(a < b && b < c);
        assert!(a.file_name() < b.file_name());
        assert!(b.file_name() < c.file_name());
    }
}
