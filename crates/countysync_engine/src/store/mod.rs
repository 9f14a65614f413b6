//! Target stores.
//!
//! The engine writes to three persisted stores: spatial, statistics,
//! and working. Stores are opaque keyed byte stores — the engine owns
//! the projection encoding, the store owns durability and the
//! stage/promote/discard lifecycle.

mod codec;
mod file;

pub use codec::{compute_crc32, encode_projection};
pub use file::FileStore;

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one of the three target stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Geometry-bearing records.
    Spatial,
    /// Aggregate-friendly statistics columns.
    Stats,
    /// Editable working columns.
    Working,
}

impl StoreKind {
    /// The fixed commit order: spatial → stats → working.
    ///
    /// Promotion must follow this order so a partially promoted batch
    /// can be recovered deterministically.
    pub const COMMIT_ORDER: [StoreKind; 3] =
        [StoreKind::Spatial, StoreKind::Stats, StoreKind::Working];

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            StoreKind::Spatial => "spatial",
            StoreKind::Stats => "stats",
            StoreKind::Working => "working",
        }
    }

    /// File name of the live store within the output directory.
    pub fn file_name(self) -> &'static str {
        match self {
            StoreKind::Spatial => "spatial.dat",
            StoreKind::Stats => "stats.dat",
            StoreKind::Working => "working.dat",
        }
    }

    /// Format tag byte written into store file headers.
    pub(crate) fn tag(self) -> u8 {
        match self {
            StoreKind::Spatial => 1,
            StoreKind::Stats => 2,
            StoreKind::Working => 3,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the three persisted target stores.
///
/// Implementations must make `promote` atomic per store (rename-style
/// swap): an observer sees either the old live content or the new one,
/// never a partial write.
pub trait TargetStore: Send + Sync {
    /// Which store this is.
    fn kind(&self) -> StoreKind;

    /// Loads the live entries. A store that does not exist yet loads
    /// as empty.
    fn load(&self) -> SyncResult<BTreeMap<String, Vec<u8>>>;

    /// Writes the full post-run entry set to the staged (not yet
    /// visible) location.
    fn stage(&self, entries: &BTreeMap<String, Vec<u8>>) -> SyncResult<()>;

    /// True if a staged file is present.
    fn has_staged(&self) -> SyncResult<bool>;

    /// Atomically promotes the staged file to the live location.
    fn promote(&self) -> SyncResult<()>;

    /// Removes the staged file, leaving the live store untouched.
    fn discard(&self) -> SyncResult<()>;
}
