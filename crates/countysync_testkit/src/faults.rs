//! Fault injection for target stores.

use countysync_engine::{FileStore, StoreKind, SyncError, SyncResult, TargetStore};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which operation the wrapped store should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Fail the `stage` call.
    Stage,
    /// Fail the `promote` call.
    Promote,
}

/// A file store wrapper that fails on command.
///
/// The fault is armed through a shared handle, so a test can hold the
/// handle while the engine owns the store. A disarmed store behaves
/// exactly like the wrapped [`FileStore`].
pub struct FailingStore {
    inner: FileStore,
    mode: FaultMode,
    armed: Arc<AtomicBool>,
}

impl FailingStore {
    /// Creates a failing store over a file store in the standard
    /// layout, returning the store and the arming handle.
    pub fn new(
        kind: StoreKind,
        out_dir: &Path,
        stage_dir: &Path,
        mode: FaultMode,
    ) -> (Self, Arc<AtomicBool>) {
        let armed = Arc::new(AtomicBool::new(false));
        let store = Self {
            inner: FileStore::new(kind, out_dir, stage_dir),
            mode,
            armed: Arc::clone(&armed),
        };
        (store, armed)
    }

    fn should_fail(&self, mode: FaultMode) -> bool {
        self.armed.load(Ordering::SeqCst) && self.mode == mode
    }
}

impl TargetStore for FailingStore {
    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }

    fn load(&self) -> SyncResult<BTreeMap<String, Vec<u8>>> {
        self.inner.load()
    }

    fn stage(&self, entries: &BTreeMap<String, Vec<u8>>) -> SyncResult<()> {
        if self.should_fail(FaultMode::Stage) {
            return Err(SyncError::Staging {
                store: self.kind(),
                message: "injected staging fault".to_string(),
            });
        }
        self.inner.stage(entries)
    }

    fn has_staged(&self) -> SyncResult<bool> {
        self.inner.has_staged()
    }

    fn promote(&self) -> SyncResult<()> {
        if self.should_fail(FaultMode::Promote) {
            return Err(SyncError::Commit {
                store: self.kind(),
                message: "injected promote fault".to_string(),
            });
        }
        self.inner.promote()
    }

    fn discard(&self) -> SyncResult<()> {
        self.inner.discard()
    }
}
