//! Engine configuration.

use std::path::PathBuf;

/// Default fingerprinting chunk size.
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Default number of old snapshot generations kept after pruning.
pub const DEFAULT_SNAPSHOT_KEEP: usize = 1;

/// Configuration for a [`crate::SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the stores, snapshots, and audit log.
    pub output_dir: PathBuf,
    /// Records fingerprinted per progress chunk.
    pub batch_size: usize,
    /// Old snapshot generations to keep beyond the current one.
    pub snapshot_keep: usize,
}

impl SyncConfig {
    /// Creates a configuration with defaults for everything but the
    /// output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            snapshot_keep: DEFAULT_SNAPSHOT_KEEP,
        }
    }

    /// Sets the fingerprinting chunk size. Values below 1 are clamped.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets how many old snapshot generations to keep.
    #[must_use]
    pub fn with_snapshot_keep(mut self, snapshot_keep: usize) -> Self {
        self.snapshot_keep = snapshot_keep;
        self
    }
}
