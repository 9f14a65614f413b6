//! Output directory management.
//!
//! CountySync lays its durable state out in a single directory:
//!
//! ```text
//! <out_dir>/
//! ├─ LOCK               # Advisory lock for single-writer
//! ├─ CURRENT            # Pointer to the current snapshot file
//! ├─ snapshot-NNNNNN.dat
//! ├─ spatial.dat        # Live target stores
//! ├─ stats.dat
//! ├─ working.dat
//! ├─ audit.log          # Append-only run history
//! └─ stage/             # Staged files and the COMMIT marker
//! ```
//!
//! The LOCK file ensures only one engine writes to a working copy at a
//! time; the design provides no finer-grained mutual exclusion.

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const STAGE_DIR: &str = "stage";
const AUDIT_FILE: &str = "audit.log";
const COMMIT_MARKER: &str = "COMMIT";

/// Holds the output directory layout and the single-writer lock.
///
/// Only one `OutputDir` instance can exist per directory at a time;
/// a second open returns [`SyncError::Locked`].
#[derive(Debug)]
pub struct OutputDir {
    path: PathBuf,
    _lock_file: File,
}

impl OutputDir {
    /// Opens or creates the output directory and acquires its lock.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Locked`] if another process holds the
    /// lock, or an I/O error if the directory cannot be created.
    pub fn open(path: &Path) -> SyncResult<Self> {
        fs::create_dir_all(path)?;

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the output directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the staging directory path.
    #[must_use]
    pub fn stage_dir(&self) -> PathBuf {
        self.path.join(STAGE_DIR)
    }

    /// Returns the audit log path.
    #[must_use]
    pub fn audit_path(&self) -> PathBuf {
        self.path.join(AUDIT_FILE)
    }

    /// Returns the commit marker path.
    #[must_use]
    pub fn commit_marker_path(&self) -> PathBuf {
        self.stage_dir().join(COMMIT_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        assert!(!out.exists());

        let dir = OutputDir::open(&out).unwrap();
        assert!(out.is_dir());
        drop(dir);
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");

        let _dir1 = OutputDir::open(&out).unwrap();
        assert!(matches!(OutputDir::open(&out), Err(SyncError::Locked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");

        {
            let _dir = OutputDir::open(&out).unwrap();
        }
        let _dir2 = OutputDir::open(&out).unwrap();
    }

    #[test]
    fn paths_are_rooted() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let dir = OutputDir::open(&out).unwrap();

        assert_eq!(dir.stage_dir(), out.join("stage"));
        assert_eq!(dir.audit_path(), out.join("audit.log"));
        assert_eq!(dir.commit_marker_path(), out.join("stage").join("COMMIT"));
    }
}
