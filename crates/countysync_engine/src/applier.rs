//! Transactional application of a change set.
//!
//! The applier owns the three target stores and drives the
//! stage-everything-then-promote protocol:
//!
//! 1. Build and stage the full post-run entry set for every store. Any
//!    failure here discards all staged files; live state is untouched.
//! 2. Write the `COMMIT` marker. From here the run must roll forward.
//! 3. Promote every store in the fixed order spatial → stats → working.
//! 4. Remove the marker once the caller has also promoted the snapshot.
//!
//! [`TransactionalApplier::recover`] completes step 3 for a run that
//! crashed between marker write and marker removal, and discards stray
//! staged files left by a run that crashed before the marker existed.

use crate::classify::ChangeSet;
use crate::error::{SyncError, SyncResult};
use crate::store::{encode_projection, FileStore, StoreKind, TargetStore};
use countysync_model::{Record, RecordBatch};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Applies classified changes to the three target stores atomically.
pub struct TransactionalApplier {
    stores: [Box<dyn TargetStore>; 3],
    marker_path: PathBuf,
}

impl TransactionalApplier {
    /// Creates an applier over the given stores.
    ///
    /// `stores` must be one store of each kind, in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidFormat`] if the stores do not match
    /// the commit order.
    pub fn new(stores: [Box<dyn TargetStore>; 3], marker_path: PathBuf) -> SyncResult<Self> {
        for (store, expected) in stores.iter().zip(StoreKind::COMMIT_ORDER) {
            if store.kind() != expected {
                return Err(SyncError::invalid_format(format!(
                    "store order mismatch: expected {expected}, got {}",
                    store.kind()
                )));
            }
        }
        Ok(Self {
            stores,
            marker_path,
        })
    }

    /// Creates an applier over file stores in the standard layout.
    pub fn with_file_stores(
        out_dir: &Path,
        stage_dir: &Path,
        marker_path: PathBuf,
    ) -> SyncResult<Self> {
        let stores: [Box<dyn TargetStore>; 3] = [
            Box::new(FileStore::new(StoreKind::Spatial, out_dir, stage_dir)),
            Box::new(FileStore::new(StoreKind::Stats, out_dir, stage_dir)),
            Box::new(FileStore::new(StoreKind::Working, out_dir, stage_dir)),
        ];
        Self::new(stores, marker_path)
    }

    /// Stages the post-run entry set for every store.
    ///
    /// No store promotes here. On any failure every staged file is
    /// discarded and the error is returned; live stores are untouched.
    pub fn stage(&self, batch: &RecordBatch, changes: &ChangeSet) -> SyncResult<()> {
        for store in &self.stores {
            let result = self
                .build_entries(store.as_ref(), batch, changes)
                .and_then(|entries| store.stage(&entries));
            if let Err(error) = result {
                self.discard_all();
                return Err(error);
            }
        }
        Ok(())
    }

    /// Builds the full post-run entry set for one store.
    ///
    /// Added and updated keys are re-encoded from the batch. Unchanged
    /// keys carry their live payload forward untouched; an unchanged
    /// key missing from the live store (a previously failed promote, a
    /// deleted file) is re-encoded from the batch, which heals the
    /// store. Deleted keys are simply absent from the batch and so from
    /// the result.
    fn build_entries(
        &self,
        store: &dyn TargetStore,
        batch: &RecordBatch,
        changes: &ChangeSet,
    ) -> SyncResult<BTreeMap<String, Vec<u8>>> {
        let live = store.load()?;
        let mut entries = BTreeMap::new();
        for record in batch.records() {
            let key = record.key();
            if !changes.is_write(key) {
                if let Some(payload) = live.get(key) {
                    entries.insert(key.to_string(), payload.clone());
                    continue;
                }
            }
            entries.insert(key.to_string(), self.project(store.kind(), batch, record)?);
        }
        Ok(entries)
    }

    fn project(
        &self,
        kind: StoreKind,
        batch: &RecordBatch,
        record: &Record,
    ) -> SyncResult<Vec<u8>> {
        match kind {
            // The spatial store is the full record: every declared
            // attribute plus the geometry stream.
            StoreKind::Spatial => {
                let all_fields: Vec<&str> = batch
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect();
                encode_projection(record, &all_fields, true)
            }
            StoreKind::Stats => {
                encode_projection(record, &batch.schema().stats_fields(), false)
            }
            StoreKind::Working => {
                encode_projection(record, &batch.schema().working_fields(), false)
            }
        }
    }

    /// Loads the live entries of one store.
    pub fn load_store(&self, kind: StoreKind) -> SyncResult<BTreeMap<String, Vec<u8>>> {
        let store = self
            .stores
            .iter()
            .find(|s| s.kind() == kind)
            .ok_or_else(|| SyncError::invalid_format(format!("no {kind} store")))?;
        store.load()
    }

    /// True if a previous run left its commit marker behind.
    #[must_use]
    pub fn has_pending_commit(&self) -> bool {
        self.marker_path.exists()
    }

    /// Writes the commit marker, recording the snapshot generation the
    /// commit is heading for. After this, the run rolls forward.
    pub fn begin_commit(&self, target_generation: u64) -> SyncResult<()> {
        let mut file = File::create(&self.marker_path)?;
        file.write_all(target_generation.to_string().as_bytes())?;
        file.sync_all()?;
        sync_parent_dir(&self.marker_path)?;
        Ok(())
    }

    /// Promotes every staged store in commit order.
    pub fn promote_all(&self) -> SyncResult<()> {
        for store in &self.stores {
            store.promote()?;
            info!(store = %store.kind(), "promoted staged store");
        }
        Ok(())
    }

    /// Removes the commit marker. Called after the snapshot has been
    /// promoted too, completing the run.
    pub fn finish_commit(&self) -> SyncResult<()> {
        fs::remove_file(&self.marker_path)?;
        sync_parent_dir(&self.marker_path)?;
        Ok(())
    }

    /// Discards every staged file. Errors are logged and ignored;
    /// stray staged files are cleaned up again at next startup.
    pub fn discard_all(&self) {
        for store in &self.stores {
            if let Err(error) = store.discard() {
                warn!(store = %store.kind(), %error, "failed to discard staged file");
            }
        }
    }

    /// Startup recovery.
    ///
    /// With a commit marker present, promotion had begun: every store
    /// that still has a staged file is promoted (those already promoted
    /// have none), then the marker is removed. Returns `true` in that
    /// case. Without a marker, staging never completed: stray staged
    /// files are discarded and `false` is returned.
    pub fn recover(&self) -> SyncResult<bool> {
        if !self.has_pending_commit() {
            self.discard_all();
            return Ok(false);
        }

        info!("completing interrupted commit");
        for store in &self.stores {
            if store.has_staged()? {
                store.promote()?;
                info!(store = %store.kind(), "recovered staged store");
            }
        }
        self.finish_commit()?;
        Ok(true)
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::fingerprint::fingerprint_batch;
    use countysync_model::Schema;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn parcel(key: &str, owner: &str) -> Record {
        Record::new(key)
            .with_attr("owner", owner)
            .with_attr("use_code", "RES")
            .with_attr("acres", 1.5)
            .with_attr("assessed_value", 150_000i64)
    }

    fn batch(records: Vec<Record>) -> RecordBatch {
        RecordBatch::validate(Schema::parcel_default(), records)
    }

    fn applier(dir: &Path) -> TransactionalApplier {
        let stage = dir.join("stage");
        fs::create_dir_all(&stage).unwrap();
        TransactionalApplier::with_file_stores(dir, &stage, stage.join("COMMIT")).unwrap()
    }

    fn apply(applier: &TransactionalApplier, batch: &RecordBatch, changes: &ChangeSet) {
        applier.stage(batch, changes).unwrap();
        applier.begin_commit(1).unwrap();
        applier.promote_all().unwrap();
        applier.finish_commit().unwrap();
    }

    fn load(dir: &Path, kind: StoreKind) -> BTreeMap<String, Vec<u8>> {
        FileStore::new(kind, dir, &dir.join("stage")).load().unwrap()
    }

    #[test]
    fn bootstrap_writes_all_stores() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let batch = batch(vec![parcel("P-1", "Alice"), parcel("P-2", "Bob")]);
        let fps = fingerprint_batch(&batch, 100).unwrap();
        let changes = classify(&fps, &HashMap::new());

        apply(&applier, &batch, &changes);

        for kind in StoreKind::COMMIT_ORDER {
            let entries = load(dir.path(), kind);
            assert_eq!(entries.len(), 2, "{kind} store should hold both records");
        }
        assert!(!applier.has_pending_commit());
    }

    #[test]
    fn deletion_removes_key_from_every_store() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let first = batch(vec![parcel("P-1", "Alice"), parcel("P-2", "Bob")]);
        let first_fps = fingerprint_batch(&first, 100).unwrap();
        apply(&applier, &first, &classify(&first_fps, &HashMap::new()));

        let second = batch(vec![parcel("P-1", "Alice")]);
        let second_fps = fingerprint_batch(&second, 100).unwrap();
        apply(&applier, &second, &classify(&second_fps, &first_fps));

        for kind in StoreKind::COMMIT_ORDER {
            let entries = load(dir.path(), kind);
            assert!(entries.contains_key("P-1"));
            assert!(!entries.contains_key("P-2"), "{kind} should drop P-2");
        }
    }

    #[test]
    fn unchanged_payload_is_carried_forward() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let batch1 = batch(vec![parcel("P-1", "Alice")]);
        let fps = fingerprint_batch(&batch1, 100).unwrap();
        apply(&applier, &batch1, &classify(&fps, &HashMap::new()));
        let before = load(dir.path(), StoreKind::Working);

        // Identical input: everything classifies unchanged
        apply(&applier, &batch1, &classify(&fps, &fps));
        let after = load(dir.path(), StoreKind::Working);
        assert_eq!(before, after);
    }

    #[test]
    fn missing_unchanged_entry_is_healed() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let batch1 = batch(vec![parcel("P-1", "Alice")]);
        let fps = fingerprint_batch(&batch1, 100).unwrap();
        apply(&applier, &batch1, &classify(&fps, &HashMap::new()));

        // Simulate a lost live store
        fs::remove_file(dir.path().join("working.dat")).unwrap();

        apply(&applier, &batch1, &classify(&fps, &fps));
        let healed = load(dir.path(), StoreKind::Working);
        assert!(healed.contains_key("P-1"));
    }

    #[test]
    fn recover_completes_interrupted_commit() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let batch = batch(vec![parcel("P-1", "Alice")]);
        let fps = fingerprint_batch(&batch, 100).unwrap();
        let changes = classify(&fps, &HashMap::new());

        applier.stage(&batch, &changes).unwrap();
        applier.begin_commit(1).unwrap();
        // Crash before any promotion: marker present, all staged

        let recovered = applier.recover().unwrap();
        assert!(recovered);
        assert!(!applier.has_pending_commit());
        for kind in StoreKind::COMMIT_ORDER {
            assert!(load(dir.path(), kind).contains_key("P-1"));
        }
    }

    #[test]
    fn recover_discards_stray_staged_files() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let batch = batch(vec![parcel("P-1", "Alice")]);
        let fps = fingerprint_batch(&batch, 100).unwrap();
        applier.stage(&batch, &classify(&fps, &HashMap::new())).unwrap();
        // Crash before the marker: staged files are garbage

        let recovered = applier.recover().unwrap();
        assert!(!recovered);
        for kind in StoreKind::COMMIT_ORDER {
            assert!(load(dir.path(), kind).is_empty());
            assert!(!dir.path().join("stage").join(kind.file_name()).exists());
        }
    }

    #[test]
    fn store_order_is_enforced() {
        let dir = tempdir().unwrap();
        let stage = dir.path().join("stage");
        let stores: [Box<dyn TargetStore>; 3] = [
            Box::new(FileStore::new(StoreKind::Stats, dir.path(), &stage)),
            Box::new(FileStore::new(StoreKind::Spatial, dir.path(), &stage)),
            Box::new(FileStore::new(StoreKind::Working, dir.path(), &stage)),
        ];
        assert!(TransactionalApplier::new(stores, stage.join("COMMIT")).is_err());
    }

    #[test]
    fn projections_differ_per_store() {
        let dir = tempdir().unwrap();
        let applier = applier(dir.path());

        let batch = batch(vec![parcel("P-1", "Alice")]);
        let fps = fingerprint_batch(&batch, 100).unwrap();
        apply(&applier, &batch, &classify(&fps, &HashMap::new()));

        let spatial = load(dir.path(), StoreKind::Spatial);
        let stats = load(dir.path(), StoreKind::Stats);
        let working = load(dir.path(), StoreKind::Working);
        let spatial_text = String::from_utf8_lossy(&spatial["P-1"]).to_string();
        let stats_text = String::from_utf8_lossy(&stats["P-1"]).to_string();
        let working_text = String::from_utf8_lossy(&working["P-1"]).to_string();
        // Spatial carries the full record
        assert!(spatial_text.contains("owner"));
        assert!(spatial_text.contains("acres"));
        assert!(spatial_text.contains("assessed_value"));
        assert!(stats_text.contains("assessed_value"));
        assert!(!stats_text.contains("owner"));
        assert!(working_text.contains("owner"));
        assert!(!working_text.contains("acres"));
    }
}
