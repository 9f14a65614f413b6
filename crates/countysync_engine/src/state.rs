//! Sync run state machine.

use std::fmt;

/// The phase a sync run is in.
///
/// Transitions are strictly forward:
///
/// ```text
/// Idle → Fingerprinting → Classifying → Staging → Committing → Completed
///                                          │
///                                          └──→ RolledBack
/// ```
///
/// A failure during staging moves to `RolledBack`; once `Committing`
/// has begun the run either reaches `Completed` or leaves a pending
/// commit for the recovery check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run in flight.
    Idle,
    /// Validating and fingerprinting the input batch.
    Fingerprinting,
    /// Diffing fingerprints against the previous snapshot.
    Classifying,
    /// Writing staged store files.
    Staging,
    /// Promoting staged files; past the point of no return.
    Committing,
    /// Last run committed fully.
    Completed,
    /// Last run failed before commit; staged writes were discarded.
    RolledBack,
}

impl SyncState {
    /// True if a new run may begin from this state.
    #[must_use]
    pub fn can_start_run(self) -> bool {
        matches!(
            self,
            SyncState::Idle | SyncState::Completed | SyncState::RolledBack
        )
    }

    /// True if this is a resting state (no run in flight).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.can_start_run()
    }

    /// Short lowercase name for logs and audit records.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Fingerprinting => "fingerprinting",
            SyncState::Classifying => "classifying",
            SyncState::Staging => "staging",
            SyncState::Committing => "committing",
            SyncState::Completed => "completed",
            SyncState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
