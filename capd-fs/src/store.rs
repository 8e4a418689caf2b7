//! Filesystem abstraction for the capture directory.
//!
//! The supervisor never touches `std::fs` directly; everything goes through
//! [`Filesystem`] so retention, recovery and the control loop can be tested
//! against [`MockFilesystem`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::naming::{parse_capture_path, CaptureName};

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("path error: {0}")]
    Path(String),
}

impl FsError {
    /// True when the error means the path is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// A capture segment found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEntry {
    pub path: PathBuf,
    pub name: CaptureName,
    pub partial: bool,
    pub size_bytes: u64,
}

/// Trait for filesystem operations.
/// Abstracted for testing with mock implementations.
pub trait Filesystem: Send + Sync {
    /// Create directory and parents if needed.
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Create an empty file, truncating any existing content.
    fn create_file(&self, path: &Path) -> Result<(), FsError>;

    /// Append data to a file, creating it if it doesn't exist.
    fn append(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Rename a file, replacing the destination if present.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> Result<(), FsError>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Current size of a file in bytes.
    fn file_size(&self, path: &Path) -> Result<u64, FsError>;

    /// List capture segments in a directory, oldest first.
    ///
    /// A missing directory yields an empty list.
    fn list_captures(&self, dir: &Path) -> Result<Vec<CaptureEntry>, FsError>;
}

impl<F: Filesystem + ?Sized> Filesystem for &F {
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        (**self).create_dir_all(path)
    }

    fn create_file(&self, path: &Path) -> Result<(), FsError> {
        (**self).create_file(path)
    }

    fn append(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        (**self).append(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        (**self).rename(from, to)
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        (**self).remove(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn file_size(&self, path: &Path) -> Result<u64, FsError> {
        (**self).file_size(path)
    }

    fn list_captures(&self, dir: &Path) -> Result<Vec<CaptureEntry>, FsError> {
        (**self).list_captures(dir)
    }
}

fn sort_entries(entries: &mut [CaptureEntry]) {
    entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.partial.cmp(&b.partial)));
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn create_file(&self, path: &Path) -> Result<(), FsError> {
        fs::File::create(path)?;
        Ok(())
    }

    fn append(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        file.sync_data()?;

        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Result<u64, FsError> {
        Ok(fs::metadata(path)?.len())
    }

    fn list_captures(&self, dir: &Path) -> Result<Vec<CaptureEntry>, FsError> {
        let mut entries = Vec::new();

        if !dir.exists() {
            return Ok(entries);
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(parsed) = parse_capture_path(&path) else {
                continue;
            };
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(CaptureEntry {
                path,
                name: parsed.name,
                partial: parsed.partial,
                size_bytes: metadata.len(),
            });
        }

        sort_entries(&mut entries);
        Ok(entries)
    }
}

/// Mock filesystem for testing.
///
/// File contents are tracked as sizes rather than bytes so tests can model
/// multi-megabyte captures cheaply. Cloning creates a new handle to the same
/// underlying data.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    files: Arc<RwLock<HashMap<PathBuf, u64>>>,
    dirs: Arc<RwLock<HashSet<PathBuf>>>,
    failing_removals: Arc<RwLock<HashSet<PathBuf>>>,
    failing_renames: Arc<RwLock<HashSet<PathBuf>>>,
    fail_creates: Arc<RwLock<bool>>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file of the given size directly (for test setup).
    pub fn add_file(&self, path: PathBuf, size_bytes: u64) {
        self.files.write().unwrap().insert(path, size_bytes);
    }

    /// Overwrite the size of an existing or new file, as a running capture would.
    pub fn set_size(&self, path: &Path, size_bytes: u64) {
        self.files
            .write()
            .unwrap()
            .insert(path.to_path_buf(), size_bytes);
    }

    /// Size of a file, if present.
    pub fn size_of(&self, path: &Path) -> Option<u64> {
        self.files.read().unwrap().get(path).copied()
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.read().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Make `remove` fail with permission denied for this path.
    pub fn fail_removal_of(&self, path: PathBuf) {
        self.failing_removals.write().unwrap().insert(path);
    }

    /// Make `rename` fail with permission denied when moving this path.
    pub fn fail_rename_of(&self, path: PathBuf) {
        self.failing_renames.write().unwrap().insert(path);
    }

    /// Make `create_file` fail (simulates a full or read-only disk).
    pub fn set_fail_creates(&self, fail: bool) {
        *self.fail_creates.write().unwrap() = fail;
    }
}

impl Filesystem for MockFilesystem {
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.dirs.write().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn create_file(&self, path: &Path) -> Result<(), FsError> {
        if *self.fail_creates.read().unwrap() {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::Other,
                "no space left on device",
            )));
        }
        self.files.write().unwrap().insert(path.to_path_buf(), 0);
        Ok(())
    }

    fn append(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let mut files = self.files.write().unwrap();
        let size = files.entry(path.to_path_buf()).or_insert(0);
        *size += data.len() as u64;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        if self.failing_renames.read().unwrap().contains(from) {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", from.display()),
            )));
        }
        let mut files = self.files.write().unwrap();
        match files.remove(from) {
            Some(size) => {
                files.insert(to.to_path_buf(), size);
                Ok(())
            }
            None => Err(FsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", from.display()),
            ))),
        }
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        if self.failing_removals.read().unwrap().contains(path) {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            )));
        }
        match self.files.write().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(FsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            ))),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path) || self.dirs.read().unwrap().contains(path)
    }

    fn file_size(&self, path: &Path) -> Result<u64, FsError> {
        self.size_of(path).ok_or_else(|| {
            FsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            ))
        })
    }

    fn list_captures(&self, dir: &Path) -> Result<Vec<CaptureEntry>, FsError> {
        let mut entries = Vec::new();

        for (path, size) in self.files.read().unwrap().iter() {
            if path.parent() != Some(dir) {
                continue;
            }
            if let Some(parsed) = parse_capture_path(path) {
                entries.push(CaptureEntry {
                    path: path.clone(),
                    name: parsed.name,
                    partial: parsed.partial,
                    size_bytes: *size,
                });
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }
}
