//! Retention of closed capture files under a storage budget.
//!
//! The [`RetentionManager`] owns every closed segment through its
//! [`RetentionLedger`] and evicts oldest-first until the ledger fits the
//! configured limits. The segment currently being written is never in the
//! ledger, so eviction can't remove a capture mid-write.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::CaptureName;
use crate::store::{Filesystem, FsError};

/// Lifecycle state of a capture segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Open,
    Closed,
    Evicted,
}

/// One rotation segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFile {
    pub path: PathBuf,
    pub name: CaptureName,
    pub size_bytes: u64,
    pub state: FileState,
}

impl CaptureFile {
    /// A segment that a session is about to start writing.
    pub fn open(path: PathBuf, name: CaptureName) -> Self {
        Self {
            path,
            name,
            size_bytes: 0,
            state: FileState::Open,
        }
    }

    /// A finished segment.
    pub fn closed(path: PathBuf, name: CaptureName, size_bytes: u64) -> Self {
        Self {
            path,
            name,
            size_bytes,
            state: FileState::Closed,
        }
    }

    pub fn created_unix_sec(&self) -> u64 {
        self.name.created_unix_sec
    }
}

/// Retention limits. A zero value disables that limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionConfig {
    /// Maximum total bytes across closed segments.
    pub budget_bytes: u64,

    /// Maximum number of closed segments.
    pub max_files: usize,
}

impl RetentionConfig {
    pub fn new(budget_bytes: u64, max_files: usize) -> Self {
        Self {
            budget_bytes,
            max_files,
        }
    }

    fn over_limit(&self, ledger: &RetentionLedger) -> bool {
        (self.budget_bytes > 0 && ledger.total_bytes() > self.budget_bytes)
            || (self.max_files > 0 && ledger.len() > self.max_files)
    }
}

/// Closed segments ordered by creation time, ties kept in admission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionLedger {
    entries: VecDeque<CaptureFile>,
    total_bytes: u64,
}

impl RetentionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a closed segment after every entry created at or before it.
    pub fn insert(&mut self, file: CaptureFile) {
        let created = file.created_unix_sec();
        let pos = self
            .entries
            .partition_point(|e| e.created_unix_sec() <= created);
        self.total_bytes = self.total_bytes.saturating_add(file.size_bytes);
        self.entries.insert(pos, file);
    }

    /// Remove and return the oldest segment.
    pub fn pop_oldest(&mut self) -> Option<CaptureFile> {
        let file = self.entries.pop_front()?;
        self.total_bytes = self.total_bytes.saturating_sub(file.size_bytes);
        Some(file)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureFile> {
        self.entries.iter()
    }
}

/// Errors from retention operations.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("only closed capture files can be admitted: {0}")]
    NotClosed(PathBuf),
}

/// A segment whose backing file could not be deleted.
///
/// Non-fatal: the segment has already been dropped from the ledger.
#[derive(Debug)]
pub struct EvictionFailure {
    pub path: PathBuf,
    pub error: FsError,
}

/// Outcome of an eviction pass.
#[derive(Debug, Default)]
pub struct EvictionReport {
    /// Segments removed from the ledger, in eviction order.
    pub evicted: Vec<CaptureFile>,

    /// Deletions that failed.
    pub failures: Vec<EvictionFailure>,
}

impl EvictionReport {
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }

    pub fn evicted_bytes(&self) -> u64 {
        self.evicted.iter().map(|f| f.size_bytes).sum()
    }
}

/// Enforces [`RetentionConfig`] over the ledger of closed segments.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    config: RetentionConfig,
    ledger: RetentionLedger,
}

impl RetentionManager {
    pub fn new(config: RetentionConfig) -> Self {
        Self::with_ledger(config, RetentionLedger::new())
    }

    /// Resume from a ledger rebuilt at startup.
    pub fn with_ledger(config: RetentionConfig, ledger: RetentionLedger) -> Self {
        Self { config, ledger }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RetentionLedger {
        &self.ledger
    }

    /// Take ownership of a closed segment, then evict down to the limits.
    pub fn admit<F: Filesystem>(
        &mut self,
        fs: &F,
        file: CaptureFile,
    ) -> Result<EvictionReport, RetentionError> {
        if file.state != FileState::Closed {
            return Err(RetentionError::NotClosed(file.path));
        }
        self.ledger.insert(file);
        Ok(self.evict(fs))
    }

    /// Remove oldest segments until the ledger fits the configured limits.
    ///
    /// A segment already missing from disk counts as evicted. Any other delete
    /// failure is reported, and the entry still leaves the ledger.
    pub fn evict<F: Filesystem>(&mut self, fs: &F) -> EvictionReport {
        let mut report = EvictionReport::default();

        while self.config.over_limit(&self.ledger) {
            let Some(mut file) = self.ledger.pop_oldest() else {
                break;
            };
            match fs.remove(&file.path) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(error) => report.failures.push(EvictionFailure {
                    path: file.path.clone(),
                    error,
                }),
            }
            file.state = FileState::Evicted;
            report.evicted.push(file);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockFilesystem;
    use std::path::Path;

    const MB: u64 = 1_000_000;

    fn closed(dir: &Path, ts: u64, seq: u64, size: u64) -> CaptureFile {
        let name = CaptureName::new(ts, seq);
        CaptureFile::closed(dir.join(name.file_name()), name, size)
    }

    fn setup(files: &[CaptureFile]) -> MockFilesystem {
        let fs = MockFilesystem::new();
        for f in files {
            fs.add_file(f.path.clone(), f.size_bytes);
        }
        fs
    }

    // --- RetentionLedger ---

    #[test]
    fn test_ledger_orders_by_creation_time() {
        let dir = Path::new("/captures");
        let mut ledger = RetentionLedger::new();
        ledger.insert(closed(dir, 3000, 3, 1));
        ledger.insert(closed(dir, 1000, 1, 2));
        ledger.insert(closed(dir, 2000, 2, 4));

        let order: Vec<u64> = ledger.iter().map(|f| f.created_unix_sec()).collect();
        assert_eq!(order, vec![1000, 2000, 3000]);
        assert_eq!(ledger.total_bytes(), 7);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_ledger_equal_timestamps_fifo() {
        let dir = Path::new("/captures");
        let mut ledger = RetentionLedger::new();
        ledger.insert(closed(dir, 1000, 7, 1));
        ledger.insert(closed(dir, 1000, 3, 1));
        ledger.insert(closed(dir, 1000, 5, 1));

        let order: Vec<u64> = ledger.iter().map(|f| f.name.sequence).collect();
        assert_eq!(order, vec![7, 3, 5]);
    }

    #[test]
    fn test_ledger_pop_oldest_updates_total() {
        let dir = Path::new("/captures");
        let mut ledger = RetentionLedger::new();
        ledger.insert(closed(dir, 1000, 1, 10));
        ledger.insert(closed(dir, 2000, 2, 20));

        let oldest = ledger.pop_oldest().expect("entry");
        assert_eq!(oldest.created_unix_sec(), 1000);
        assert_eq!(ledger.total_bytes(), 20);
        ledger.pop_oldest();
        assert!(ledger.pop_oldest().is_none());
        assert!(ledger.is_empty());
        assert_eq!(ledger.total_bytes(), 0);
    }

    // --- Budget scenario ---

    #[test]
    fn test_admit_three_40mb_files_under_100mb_budget() {
        let dir = Path::new("/captures");
        let a = closed(dir, 1000, 1, 40 * MB);
        let b = closed(dir, 2000, 2, 40 * MB);
        let c = closed(dir, 3000, 3, 40 * MB);
        let fs = setup(&[a.clone(), b.clone(), c.clone()]);
        let mut manager = RetentionManager::new(RetentionConfig::new(100 * MB, 0));

        assert_eq!(manager.admit(&fs, a.clone()).unwrap().evicted_count(), 0);
        assert_eq!(manager.admit(&fs, b.clone()).unwrap().evicted_count(), 0);
        let report = manager.admit(&fs, c.clone()).unwrap();

        assert_eq!(report.evicted_count(), 1);
        assert_eq!(report.evicted[0].path, a.path);
        assert_eq!(report.evicted[0].state, FileState::Evicted);
        assert_eq!(report.evicted_bytes(), 40 * MB);
        assert!(!fs.exists(&a.path));
        assert!(fs.exists(&b.path));
        assert!(fs.exists(&c.path));

        let kept: Vec<&PathBuf> = manager.ledger().iter().map(|f| &f.path).collect();
        assert_eq!(kept, vec![&b.path, &c.path]);
        assert_eq!(manager.ledger().total_bytes(), 80 * MB);
        assert!(manager.ledger().total_bytes() <= 100 * MB);
    }

    #[test]
    fn test_evict_oldest_first_when_each_exceeds_budget() {
        let dir = Path::new("/captures");
        let t1 = closed(dir, 1000, 1, 50);
        let t2 = closed(dir, 2000, 2, 50);
        let t3 = closed(dir, 3000, 3, 50);
        let fs = setup(&[t1.clone(), t2.clone(), t3.clone()]);

        let mut ledger = RetentionLedger::new();
        ledger.insert(t3.clone());
        ledger.insert(t1.clone());
        ledger.insert(t2.clone());
        let mut manager = RetentionManager::with_ledger(RetentionConfig::new(10, 0), ledger);

        let report = manager.evict(&fs);

        let order: Vec<&PathBuf> = report.evicted.iter().map(|f| &f.path).collect();
        assert_eq!(order, vec![&t1.path, &t2.path, &t3.path]);
        assert!(manager.ledger().is_empty());
        assert_eq!(manager.ledger().total_bytes(), 0);
    }

    #[test]
    fn test_evict_at_budget_keeps_everything() {
        let dir = Path::new("/captures");
        let a = closed(dir, 1000, 1, 60);
        let b = closed(dir, 2000, 2, 40);
        let fs = setup(&[a.clone(), b.clone()]);
        let mut manager = RetentionManager::new(RetentionConfig::new(100, 0));

        manager.admit(&fs, a).unwrap();
        let report = manager.admit(&fs, b).unwrap();

        assert_eq!(report.evicted_count(), 0);
        assert_eq!(manager.ledger().total_bytes(), 100);
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let dir = Path::new("/captures");
        let files: Vec<CaptureFile> = (1..=5).map(|i| closed(dir, i * 1000, i, 1 << 40)).collect();
        let fs = setup(&files);
        let mut manager = RetentionManager::new(RetentionConfig::default());

        for f in files {
            assert_eq!(manager.admit(&fs, f).unwrap().evicted_count(), 0);
        }
        assert_eq!(manager.ledger().len(), 5);
    }

    #[test]
    fn test_max_files_limit() {
        let dir = Path::new("/captures");
        let files: Vec<CaptureFile> = (1..=4).map(|i| closed(dir, i * 1000, i, 1)).collect();
        let fs = setup(&files);
        let mut manager = RetentionManager::new(RetentionConfig::new(0, 2));

        for f in files.clone() {
            manager.admit(&fs, f).unwrap();
        }

        let kept: Vec<u64> = manager.ledger().iter().map(|f| f.name.sequence).collect();
        assert_eq!(kept, vec![3, 4]);
        assert!(!fs.exists(&files[0].path));
        assert!(!fs.exists(&files[1].path));
    }

    // --- Failure handling ---

    #[test]
    fn test_admit_rejects_open_file() {
        let fs = MockFilesystem::new();
        let mut manager = RetentionManager::new(RetentionConfig::new(100, 0));
        let name = CaptureName::new(1000, 1);
        let open = CaptureFile::open(PathBuf::from("/captures/x.part"), name);

        let err = manager.admit(&fs, open).unwrap_err();
        assert!(matches!(err, RetentionError::NotClosed(_)));
        assert!(manager.ledger().is_empty());
    }

    #[test]
    fn test_deletion_failure_drops_entry_and_reports() {
        let dir = Path::new("/captures");
        let a = closed(dir, 1000, 1, 80);
        let b = closed(dir, 2000, 2, 80);
        let fs = setup(&[a.clone(), b.clone()]);
        fs.fail_removal_of(a.path.clone());
        let mut manager = RetentionManager::new(RetentionConfig::new(100, 0));

        manager.admit(&fs, a.clone()).unwrap();
        let report = manager.admit(&fs, b.clone()).unwrap();

        assert_eq!(report.evicted_count(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, a.path);
        // File is still on disk, but the ledger no longer tracks it
        assert!(fs.exists(&a.path));
        assert_eq!(manager.ledger().len(), 1);
        assert_eq!(manager.ledger().total_bytes(), 80);
    }

    #[test]
    fn test_already_removed_file_is_not_a_failure() {
        let dir = Path::new("/captures");
        let a = closed(dir, 1000, 1, 80);
        let b = closed(dir, 2000, 2, 80);
        let fs = setup(&[b.clone()]);
        let mut manager = RetentionManager::new(RetentionConfig::new(100, 0));

        manager.admit(&fs, a).unwrap();
        let report = manager.admit(&fs, b).unwrap();

        assert_eq!(report.evicted_count(), 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_total_never_exceeds_budget_after_evict() {
        let dir = Path::new("/captures");
        let sizes = [30, 70, 10, 95, 5, 60, 40, 100, 1];
        let files: Vec<CaptureFile> = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| closed(dir, 1000 + i as u64, i as u64, *s))
            .collect();
        let fs = setup(&files);
        let mut manager = RetentionManager::new(RetentionConfig::new(100, 0));

        for f in files {
            manager.admit(&fs, f).unwrap();
            assert!(manager.ledger().total_bytes() <= 100);
        }
    }
}
