//! Error types for the sync engine.

use crate::store::StoreKind;
use countysync_model::ModelError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error outside the staged/commit paths.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data-model error (validation, canonicalization).
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Another process holds the output-directory lock.
    #[error("output directory is locked by another sync run")]
    Locked,

    /// The previous snapshot cannot be read or fails its integrity
    /// check. The run refuses to start rather than guess a baseline.
    #[error("snapshot corrupted: {0}")]
    SnapshotCorruption(String),

    /// I/O or format failure while writing a staged store file.
    /// Fatal to the run; all staged writes are discarded and live
    /// state is untouched.
    #[error("staging failed for {store} store: {message}")]
    Staging {
        /// The store whose staging failed.
        store: StoreKind,
        /// Underlying failure.
        message: String,
    },

    /// Failure while promoting a staged store file after staging
    /// succeeded. Requires the recovery check before the next run.
    #[error("commit failed while promoting {store} store: {message}")]
    Commit {
        /// The store whose promotion failed.
        store: StoreKind,
        /// Underlying failure.
        message: String,
    },

    /// A previous run left a pending commit marker; the recovery
    /// check must complete the promotion before new input is accepted.
    #[error("pending commit from a previous run; recovery required")]
    RecoveryRequired,

    /// The run was cancelled before commit began.
    #[error("sync run cancelled")]
    Cancelled,

    /// A run was started while another is in flight.
    #[error("cannot start a run from state {from}")]
    InvalidState {
        /// The state the engine was in.
        from: &'static str,
    },

    /// A store or snapshot file has an invalid format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A store file failed its checksum.
    #[error("checksum mismatch: expected {expected:#010x}, actual {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the file.
        expected: u32,
        /// Checksum computed over the file contents.
        actual: u32,
    },
}

impl SyncError {
    /// Creates an invalid-format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    /// Returns true if a retry is safe without any recovery step.
    ///
    /// Staging failures and snapshot corruption leave live state
    /// untouched. A commit failure means promotion may be partial:
    /// the recovery check must run before retrying.
    pub fn is_safe_to_retry(&self) -> bool {
        matches!(
            self,
            SyncError::Staging { .. }
                | SyncError::SnapshotCorruption(_)
                | SyncError::Locked
                | SyncError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let staging = SyncError::Staging {
            store: StoreKind::Stats,
            message: "disk full".into(),
        };
        assert!(staging.is_safe_to_retry());
        assert!(SyncError::SnapshotCorruption("bad crc".into()).is_safe_to_retry());
        assert!(SyncError::Locked.is_safe_to_retry());

        let commit = SyncError::Commit {
            store: StoreKind::Spatial,
            message: "rename failed".into(),
        };
        assert!(!commit.is_safe_to_retry());
        assert!(!SyncError::RecoveryRequired.is_safe_to_retry());
    }

    #[test]
    fn error_display_names_store() {
        let err = SyncError::Staging {
            store: StoreKind::Working,
            message: "io".into(),
        };
        assert!(err.to_string().contains("working"));
    }
}
