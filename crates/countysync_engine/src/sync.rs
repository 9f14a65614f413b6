//! The sync orchestrator.
//!
//! [`SyncEngine`] ties the pieces together: it owns the output
//! directory lock, the snapshot store, the transactional applier, and
//! the audit log, and drives one validated batch through the full
//! fingerprint → classify → stage → commit sequence.

use crate::applier::TransactionalApplier;
use crate::audit::{now_ms, AuditLog, RunOutcome, RunResult};
use crate::classify::{classify, ChangeSet};
use crate::config::SyncConfig;
use crate::dir::OutputDir;
use crate::error::{SyncError, SyncResult};
use crate::fingerprint::{fingerprint_record, Fingerprint};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::state::SyncState;
use crate::store::{StoreKind, TargetStore};
use countysync_model::RecordBatch;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a store/snapshot consistency check.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Generation of the snapshot the stores were checked against.
    pub snapshot_generation: u64,
    /// Number of keys in the snapshot.
    pub snapshot_keys: usize,
    /// Human-readable inconsistencies; empty means clean.
    pub issues: Vec<String>,
}

impl VerifyReport {
    /// True if no inconsistencies were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// The sync engine.
///
/// One engine instance holds the output-directory lock for its
/// lifetime; runs execute one at a time. Opening the engine performs
/// crash recovery, so a successfully opened engine always starts from
/// a consistent baseline.
pub struct SyncEngine {
    config: SyncConfig,
    dir: OutputDir,
    applier: TransactionalApplier,
    snapshots: SnapshotStore,
    audit: AuditLog,
    state: RwLock<SyncState>,
    cancel: AtomicBool,
}

impl SyncEngine {
    /// Opens the engine over file-backed stores in the standard
    /// layout, running crash recovery first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Locked`] if another engine holds the
    /// directory, or any error from the recovery pass.
    pub fn open(config: SyncConfig) -> SyncResult<Self> {
        let dir = OutputDir::open(&config.output_dir)?;
        fs::create_dir_all(dir.stage_dir())?;
        let applier = TransactionalApplier::with_file_stores(
            dir.path(),
            &dir.stage_dir(),
            dir.commit_marker_path(),
        )?;
        Self::with_applier(config, dir, applier)
    }

    /// Opens the engine over caller-provided stores. The stores must
    /// be one of each kind in commit order.
    pub fn open_with_stores(
        config: SyncConfig,
        stores: [Box<dyn TargetStore>; 3],
    ) -> SyncResult<Self> {
        let dir = OutputDir::open(&config.output_dir)?;
        fs::create_dir_all(dir.stage_dir())?;
        let applier = TransactionalApplier::new(stores, dir.commit_marker_path())?;
        Self::with_applier(config, dir, applier)
    }

    fn with_applier(
        config: SyncConfig,
        dir: OutputDir,
        applier: TransactionalApplier,
    ) -> SyncResult<Self> {
        if applier.recover()? {
            info!("recovered an interrupted commit");
        }
        let snapshots = SnapshotStore::new(dir.path(), config.snapshot_keep);
        let audit = AuditLog::new(&dir.audit_path());
        Ok(Self {
            config,
            dir,
            applier,
            snapshots,
            audit,
            state: RwLock::new(SyncState::Idle),
            cancel: AtomicBool::new(false),
        })
    }

    /// Current state of the engine.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Output directory this engine operates on.
    pub fn output_dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Requests cancellation of the in-flight run.
    ///
    /// Honored at phase boundaries up to the start of commit; once
    /// commit begins the run rolls forward regardless.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn check_cancel(&self) -> SyncResult<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one sync over a validated batch.
    ///
    /// On success the returned [`RunResult`] has been appended to the
    /// audit log; an append failure is logged but does not fail the
    /// run, since the commit itself is already durable. On failure the
    /// error is returned after a failed audit record is appended;
    /// staged writes are discarded
    /// unless the failure happened during commit, in which case the
    /// pending commit is completed at next open.
    pub fn run(&self, batch: &RecordBatch) -> SyncResult<RunResult> {
        {
            let mut state = self.state.write();
            if !state.can_start_run() {
                return Err(SyncError::InvalidState { from: state.name() });
            }
            *state = SyncState::Fingerprinting;
        }
        self.cancel.store(false, Ordering::SeqCst);

        let run_id = Uuid::new_v4();
        let started_at_ms = now_ms();
        info!(%run_id, records = batch.len(), malformed = batch.rejected().len(), "sync run started");

        if self.applier.has_pending_commit() {
            // Should have been handled at open; do not touch anything.
            self.set_state(SyncState::RolledBack);
            return Err(SyncError::RecoveryRequired);
        }

        match self.run_inner(batch) {
            Ok((changes, generation)) => {
                let finished_at_ms = now_ms();
                let result = RunResult {
                    run_id,
                    started_at_ms,
                    finished_at_ms,
                    elapsed_ms: finished_at_ms.saturating_sub(started_at_ms),
                    added: changes.added.len(),
                    updated: changes.updated.len(),
                    deleted: changes.deleted.len(),
                    unchanged: changes.unchanged.len(),
                    added_keys: changes.added.iter().cloned().collect(),
                    updated_keys: changes.updated.iter().cloned().collect(),
                    deleted_keys: changes.deleted.iter().cloned().collect(),
                    malformed: batch.rejected().len(),
                    snapshot_generation: generation,
                    outcome: RunOutcome::Completed,
                };
                self.set_state(SyncState::Completed);
                // The commit is already durable; a broken audit log
                // must not turn a completed run into an error.
                if let Err(audit_error) = self.audit.append(&result) {
                    warn!(%audit_error, "failed to append audit record");
                }
                info!(
                    %run_id,
                    added = result.added,
                    updated = result.updated,
                    deleted = result.deleted,
                    unchanged = result.unchanged,
                    "sync run completed"
                );
                Ok(result)
            }
            Err(error) => {
                let stage = self.state().name().to_string();
                let committing = self.state() == SyncState::Committing;
                if !committing {
                    self.applier.discard_all();
                    self.set_state(SyncState::RolledBack);
                }
                warn!(%run_id, %error, stage, "sync run failed");

                let finished_at_ms = now_ms();
                let result = RunResult {
                    run_id,
                    started_at_ms,
                    finished_at_ms,
                    elapsed_ms: finished_at_ms.saturating_sub(started_at_ms),
                    added: 0,
                    updated: 0,
                    deleted: 0,
                    unchanged: 0,
                    added_keys: Vec::new(),
                    updated_keys: Vec::new(),
                    deleted_keys: Vec::new(),
                    malformed: batch.rejected().len(),
                    snapshot_generation: self
                        .snapshots
                        .load_current()
                        .map(|s| s.generation)
                        .unwrap_or(0),
                    outcome: RunOutcome::Failed {
                        stage,
                        error: error.to_string(),
                    },
                };
                if let Err(audit_error) = self.audit.append(&result) {
                    warn!(%audit_error, "failed to append audit record");
                }
                Err(error)
            }
        }
    }

    fn run_inner(&self, batch: &RecordBatch) -> SyncResult<(ChangeSet, u64)> {
        let previous = self.snapshots.load_current()?;

        let mut fingerprints: HashMap<String, Fingerprint> =
            HashMap::with_capacity(batch.len());
        for chunk in batch.records().chunks(self.config.batch_size) {
            self.check_cancel()?;
            for record in chunk {
                fingerprints.insert(record.key().to_string(), fingerprint_record(record)?);
            }
        }

        self.set_state(SyncState::Classifying);
        self.check_cancel()?;
        let changes = classify(&fingerprints, &previous.entries);

        if changes.is_noop() {
            info!(unchanged = changes.unchanged.len(), "no changes, skipping write");
            return Ok((changes, previous.generation));
        }

        self.set_state(SyncState::Staging);
        self.check_cancel()?;
        self.applier.stage(batch, &changes)?;

        // Last cancellation point; commit rolls forward from here.
        self.check_cancel()?;
        self.set_state(SyncState::Committing);
        let generation = previous.generation + 1;
        self.applier.begin_commit(generation)?;
        self.applier.promote_all()?;

        let snapshot = Snapshot {
            generation,
            entries: fingerprints,
        };
        self.snapshots.commit(&snapshot)?;
        self.applier.finish_commit()?;

        Ok((changes, snapshot.generation))
    }

    /// Reads the most recent `limit` audit records, newest first.
    pub fn history(&self, limit: usize) -> SyncResult<Vec<RunResult>> {
        self.audit.read_recent(limit)
    }

    /// Checks every store against the current snapshot.
    ///
    /// Each store must decode cleanly and hold exactly the snapshot's
    /// key set. A pending commit marker is reported as an issue.
    pub fn verify(&self) -> SyncResult<VerifyReport> {
        let snapshot = self.snapshots.load_current()?;
        let mut issues = Vec::new();

        if self.applier.has_pending_commit() {
            issues.push("pending commit marker present".to_string());
        }

        for kind in StoreKind::COMMIT_ORDER {
            match self.applier.load_store(kind) {
                Ok(entries) => {
                    for key in snapshot.entries.keys() {
                        if !entries.contains_key(key) {
                            issues.push(format!("{kind} store missing key {key}"));
                        }
                    }
                    for key in entries.keys() {
                        if !snapshot.entries.contains_key(key) {
                            issues.push(format!("{kind} store has stale key {key}"));
                        }
                    }
                }
                Err(error) => issues.push(format!("{kind} store unreadable: {error}")),
            }
        }

        Ok(VerifyReport {
            snapshot_generation: snapshot.generation,
            snapshot_keys: snapshot.len(),
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countysync_model::{Record, Schema};
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

    #[test]
    fn bootstrap_run_adds_everything() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        let result = engine
            .run(&batch(vec![parcel("P-1", "Alice"), parcel("P-2", "Bob")]))
            .unwrap();
        assert_eq!(result.added, 2);
        assert_eq!(result.snapshot_generation, 1);
        assert!(result.outcome.is_completed());
        assert_eq!(engine.state(), SyncState::Completed);
    }

    #[test]
    fn identical_rerun_is_noop() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        let input = batch(vec![parcel("P-1", "Alice")]);
        let first = engine.run(&input).unwrap();
        let second = engine.run(&input).unwrap();

        assert_eq!(second.added, 0);
        assert_eq!(second.unchanged, 1);
        // No new snapshot generation for a no-op run
        assert_eq!(second.snapshot_generation, first.snapshot_generation);
    }

    #[test]
    fn update_and_delete_are_applied() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        engine
            .run(&batch(vec![parcel("P-1", "Alice"), parcel("P-2", "Bob")]))
            .unwrap();
        let result = engine
            .run(&batch(vec![parcel("P-1", "Carol")]))
            .unwrap();

        assert_eq!(result.updated, 1);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.snapshot_generation, 2);
    }

    #[test]
    fn cancel_flag_resets_at_run_start() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        // A stale cancel request must not poison the next run
        engine.cancel();
        let result = engine.run(&batch(vec![parcel("P-1", "Alice")]));
        assert!(result.is_ok());
    }

    #[test]
    fn verify_reports_clean_after_run() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();
        engine
            .run(&batch(vec![parcel("P-1", "Alice"), parcel("P-2", "Bob")]))
            .unwrap();

        let report = engine.verify().unwrap();
        assert!(report.is_clean(), "issues: {:?}", report.issues);
        assert_eq!(report.snapshot_keys, 2);
    }

    #[test]
    fn history_records_every_run() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        engine.run(&batch(vec![parcel("P-1", "Alice")])).unwrap();
        engine.run(&batch(vec![parcel("P-1", "Bob")])).unwrap();

        let history = engine.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].updated, 1);
        assert_eq!(history[0].updated_keys, vec!["P-1"]);
        assert_eq!(history[1].added, 1);
        assert_eq!(history[1].added_keys, vec!["P-1"]);
        assert!(history[1].deleted_keys.is_empty());
    }

    #[test]
    fn run_succeeds_even_if_audit_append_fails() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        // A directory squatting on the log path makes every append fail
        std::fs::create_dir(dir.path().join("audit.log")).unwrap();

        let result = engine.run(&batch(vec![parcel("P-1", "Alice")])).unwrap();
        assert_eq!(result.added, 1);
        assert!(result.outcome.is_completed());
        assert_eq!(engine.state(), SyncState::Completed);
    }

    #[test]
    fn malformed_count_is_audited() {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();

        let input = batch(vec![
            parcel("P-1", "Alice"),
            parcel("P-1", "Bob"),
            parcel("P-2", "Carol"),
        ]);
        let result = engine.run(&input).unwrap();
        assert_eq!(result.malformed, 2);
        assert_eq!(result.added, 1);
    }

    #[test]
    fn second_engine_is_locked_out() {
        let dir = tempdir().unwrap();
        let _engine = SyncEngine::open(SyncConfig::new(dir.path())).unwrap();
        assert!(matches!(
            SyncEngine::open(SyncConfig::new(dir.path())),
            Err(SyncError::Locked)
        ));
    }
}
