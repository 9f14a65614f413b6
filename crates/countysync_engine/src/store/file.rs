//! File-backed target store.

use crate::error::{SyncError, SyncResult};
use crate::store::codec::{decode_entries, encode_entries};
use crate::store::{StoreKind, TargetStore};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file-backed target store.
///
/// The live store is one file in the output directory; the staged
/// file lives under `stage/` until promotion renames it over the live
/// file. Promotion is atomic per store: readers observe either the old
/// content or the new, never a partial write.
#[derive(Debug)]
pub struct FileStore {
    kind: StoreKind,
    live_path: PathBuf,
    staged_path: PathBuf,
}

impl FileStore {
    /// Creates a file store for `kind` rooted at the output directory.
    ///
    /// `stage_dir` is the staging directory (normally `<out>/stage`).
    pub fn new(kind: StoreKind, out_dir: &Path, stage_dir: &Path) -> Self {
        Self {
            kind,
            live_path: out_dir.join(kind.file_name()),
            staged_path: stage_dir.join(kind.file_name()),
        }
    }

    /// Path of the live store file.
    #[must_use]
    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// Path of the staged store file.
    #[must_use]
    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    fn staging_err(&self, message: impl std::fmt::Display) -> SyncError {
        SyncError::Staging {
            store: self.kind,
            message: message.to_string(),
        }
    }

    fn commit_err(&self, message: impl std::fmt::Display) -> SyncError {
        SyncError::Commit {
            store: self.kind,
            message: message.to_string(),
        }
    }

    /// Fsyncs a directory so renames and creations within it are
    /// durable.
    #[cfg(unix)]
    fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
        // NTFS journaling covers metadata durability on Windows
        Ok(())
    }
}

impl TargetStore for FileStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn load(&self) -> SyncResult<BTreeMap<String, Vec<u8>>> {
        if !self.live_path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read(&self.live_path)?;
        decode_entries(self.kind, &data)
    }

    fn stage(&self, entries: &BTreeMap<String, Vec<u8>>) -> SyncResult<()> {
        if let Some(parent) = self.staged_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.staging_err(e))?;
        }
        let data = encode_entries(self.kind, entries);
        let mut file = File::create(&self.staged_path).map_err(|e| self.staging_err(e))?;
        file.write_all(&data).map_err(|e| self.staging_err(e))?;
        file.sync_all().map_err(|e| self.staging_err(e))?;
        Ok(())
    }

    fn has_staged(&self) -> SyncResult<bool> {
        Ok(self.staged_path.exists())
    }

    fn promote(&self) -> SyncResult<()> {
        fs::rename(&self.staged_path, &self.live_path).map_err(|e| self.commit_err(e))?;
        Self::sync_parent_dir(&self.live_path).map_err(|e| self.commit_err(e))?;
        Ok(())
    }

    fn discard(&self) -> SyncResult<()> {
        if self.staged_path.exists() {
            fs::remove_file(&self.staged_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> FileStore {
        FileStore::new(StoreKind::Spatial, dir, &dir.join("stage"))
    }

    fn entries(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.to_vec()))
            .collect()
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn stage_then_promote_becomes_live() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let data = entries(&[("P-1", b"alpha")]);
        store.stage(&data).unwrap();
        assert!(store.has_staged().unwrap());
        // Not visible until promoted
        assert!(store.load().unwrap().is_empty());

        store.promote().unwrap();
        assert!(!store.has_staged().unwrap());
        assert_eq!(store.load().unwrap(), data);
    }

    #[test]
    fn discard_leaves_live_untouched() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let live = entries(&[("P-1", b"alpha")]);
        store.stage(&live).unwrap();
        store.promote().unwrap();

        store.stage(&entries(&[("P-2", b"beta")])).unwrap();
        store.discard().unwrap();

        assert!(!store.has_staged().unwrap());
        assert_eq!(store.load().unwrap(), live);
    }

    #[test]
    fn promote_without_staged_fails() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.promote(),
            Err(SyncError::Commit { .. })
        ));
    }

    #[test]
    fn promote_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store.stage(&entries(&[("P-1", b"v1")])).unwrap();
        store.promote().unwrap();

        let v2 = entries(&[("P-1", b"v2"), ("P-2", b"new")]);
        store.stage(&v2).unwrap();
        store.promote().unwrap();

        assert_eq!(store.load().unwrap(), v2);
    }

    #[test]
    fn corrupt_live_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        fs::write(store.live_path(), b"garbage").unwrap();
        assert!(store.load().is_err());
    }
}
