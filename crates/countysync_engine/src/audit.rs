//! Audit log of sync runs.
//!
//! Every run, successful or not, appends one JSON line to `audit.log`:
//! aggregate counts plus the per-key change lists, so the log doubles
//! as a change log. The log is append-only; history reads parse it
//! back newest-last.
//! A line that fails to parse is skipped with a warning so one corrupt
//! record cannot hide the rest of the history.

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All stores and the snapshot were promoted.
    Completed,
    /// The run failed; `stage` names the phase it failed in.
    Failed {
        /// Phase the run was in when it failed.
        stage: String,
        /// Rendered error.
        error: String,
    },
}

impl RunOutcome {
    /// True if the run committed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// The audit record of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Run start, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    /// Run end, milliseconds since the Unix epoch.
    pub finished_at_ms: u64,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
    /// Records classified as added.
    pub added: usize,
    /// Records classified as updated.
    pub updated: usize,
    /// Records classified as deleted.
    pub deleted: usize,
    /// Records classified as unchanged.
    pub unchanged: usize,
    /// Keys added this run, in key order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_keys: Vec<String>,
    /// Keys updated this run, in key order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_keys: Vec<String>,
    /// Keys deleted this run, in key order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_keys: Vec<String>,
    /// Input records rejected by validation.
    pub malformed: usize,
    /// Snapshot generation after the run (unchanged on failure).
    pub snapshot_generation: u64,
    /// How the run ended.
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl RunResult {
    /// Total records that were written this run.
    #[must_use]
    pub fn written(&self) -> usize {
        self.added + self.updated
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Append-only JSON-lines audit log.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log at `path`. The file is created lazily on
    /// the first append.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Appends one run record and fsyncs the log.
    pub fn append(&self, result: &RunResult) -> SyncResult<()> {
        let mut line = serde_json::to_string(result)
            .map_err(|e| crate::error::SyncError::invalid_format(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Reads the full run history, oldest first.
    ///
    /// A missing log reads as empty. Unparseable lines are skipped.
    pub fn read_all(&self) -> SyncResult<Vec<RunResult>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut results = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(%error, line = index + 1, "skipping unparseable audit record");
                }
            }
        }
        Ok(results)
    }

    /// Reads the most recent `limit` runs, newest first.
    pub fn read_recent(&self, limit: usize) -> SyncResult<Vec<RunResult>> {
        let mut all = self.read_all()?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn result(added: usize, outcome: RunOutcome) -> RunResult {
        RunResult {
            run_id: Uuid::new_v4(),
            started_at_ms: 1000,
            finished_at_ms: 1500,
            elapsed_ms: 500,
            added,
            updated: 2,
            deleted: 1,
            unchanged: 10,
            added_keys: (0..added).map(|i| format!("P-{i}")).collect(),
            updated_keys: vec!["P-90".to_string(), "P-91".to_string()],
            deleted_keys: vec!["P-99".to_string()],
            malformed: 0,
            snapshot_generation: 3,
            outcome,
        }
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(&dir.path().join("audit.log"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(&dir.path().join("audit.log"));

        let first = result(5, RunOutcome::Completed);
        let second = result(
            0,
            RunOutcome::Failed {
                stage: "staging".into(),
                error: "disk full".into(),
            },
        );
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all, vec![first, second]);
    }

    #[test]
    fn recent_is_newest_first() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(&dir.path().join("audit.log"));

        for added in 0..5 {
            log.append(&result(added, RunOutcome::Completed)).unwrap();
        }

        let recent = log.read_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].added, 4);
        assert_eq!(recent[1].added, 3);
    }

    #[test]
    fn corrupt_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(&path);

        log.append(&result(1, RunOutcome::Completed)).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"not json\n").unwrap();
        }
        log.append(&result(2, RunOutcome::Completed)).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].added, 2);
    }

    #[test]
    fn per_key_changes_survive_the_round_trip() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(&dir.path().join("audit.log"));

        log.append(&result(3, RunOutcome::Completed)).unwrap();

        let back = &log.read_all().unwrap()[0];
        assert_eq!(back.added_keys, vec!["P-0", "P-1", "P-2"]);
        assert_eq!(back.updated_keys, vec!["P-90", "P-91"]);
        assert_eq!(back.deleted_keys, vec!["P-99"]);
    }

    #[test]
    fn empty_key_lists_are_omitted_from_json() {
        let mut completed = result(0, RunOutcome::Completed);
        completed.added_keys.clear();
        completed.updated_keys.clear();
        completed.deleted_keys.clear();

        let json = serde_json::to_string(&completed).unwrap();
        assert!(!json.contains("added_keys"));

        // And they read back as empty, not as an error
        let back: RunResult = serde_json::from_str(&json).unwrap();
        assert!(back.deleted_keys.is_empty());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let completed = result(1, RunOutcome::Completed);
        let json = serde_json::to_string(&completed).unwrap();
        assert!(json.contains("\"outcome\":\"completed\""));

        let failed = result(
            0,
            RunOutcome::Failed {
                stage: "commit".into(),
                error: "boom".into(),
            },
        );
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"outcome\":\"failed\""));
        assert!(json.contains("\"stage\":\"commit\""));
    }
}
