//! Snapshot persistence.
//!
//! A snapshot records, per key, the fingerprint of the record as it was
//! last successfully applied. Snapshots are immutable generation files
//! (`snapshot-NNNNNN.dat`) plus a `CURRENT` pointer naming the live
//! one. Promotion of a new snapshot swaps the pointer via a temp file
//! and rename, so readers always see a complete snapshot.
//!
//! File layout:
//!
//! ```text
//! | magic (4) | version (2) | generation (8) | count (4) | entries... | crc32 (4) |
//! ```
//!
//! Each entry:
//!
//! ```text
//! | key_len (2) | key bytes | fingerprint (32) |
//! ```

use crate::error::{SyncError, SyncResult};
use crate::fingerprint::{Fingerprint, FINGERPRINT_LEN};
use crate::store::compute_crc32;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for snapshot files.
const SNAPSHOT_MAGIC: [u8; 4] = *b"CSNP";
/// Current snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;
/// Header size (magic + version + generation + count).
const HEADER_SIZE: usize = 4 + 2 + 8 + 4;
/// Footer size (checksum).
const FOOTER_SIZE: usize = 4;
/// Name of the pointer file.
const CURRENT_FILE: &str = "CURRENT";

/// An in-memory snapshot: the fingerprint of every applied record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Monotonic generation number; 0 means "no snapshot yet".
    pub generation: u64,
    /// Key to fingerprint mapping.
    pub entries: HashMap<String, Fingerprint>,
}

impl Snapshot {
    /// Number of keys in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads and writes snapshot files in the output directory.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    keep: usize,
}

impl SnapshotStore {
    /// Creates a snapshot store rooted at the output directory.
    ///
    /// `keep` is how many generations to retain beyond the current one
    /// when pruning.
    pub fn new(dir: &Path, keep: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            keep,
        }
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    fn snapshot_path(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("snapshot-{generation:06}.dat"))
    }

    /// Loads the snapshot named by `CURRENT`.
    ///
    /// A missing pointer file loads as the empty generation-0 snapshot
    /// (bootstrap). A pointer naming a missing or unreadable file, or a
    /// snapshot failing its checksum, is reported as
    /// [`SyncError::SnapshotCorruption`] so the operator can intervene
    /// rather than silently re-adding everything.
    pub fn load_current(&self) -> SyncResult<Snapshot> {
        let current = self.current_path();
        if !current.exists() {
            debug!("no CURRENT pointer, starting from empty snapshot");
            return Ok(Snapshot::default());
        }

        let name = fs::read_to_string(&current)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::SnapshotCorruption(
                "CURRENT pointer is empty".to_string(),
            ));
        }
        let path = self.dir.join(name);
        let data = fs::read(&path).map_err(|e| {
            SyncError::SnapshotCorruption(format!("cannot read {}: {e}", path.display()))
        })?;
        decode_snapshot(&data)
    }

    /// Writes a new snapshot generation and swaps `CURRENT` to it.
    ///
    /// The snapshot file is written and fsynced before the pointer is
    /// updated; the pointer swap itself goes through a temp file and
    /// rename. Older generations beyond the immediately previous one
    /// are pruned.
    pub fn commit(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let data = encode_snapshot(snapshot);
        let path = self.snapshot_path(snapshot.generation);

        let mut file = File::create(&path)?;
        file.write_all(&data)?;
        file.sync_all()?;

        self.swap_current(&path)?;
        self.prune(snapshot.generation);
        debug!(
            generation = snapshot.generation,
            entries = snapshot.len(),
            "snapshot committed"
        );
        Ok(())
    }

    fn swap_current(&self, snapshot_path: &Path) -> SyncResult<()> {
        let name = snapshot_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SyncError::invalid_format("snapshot path has no file name"))?;

        let temp = self.dir.join("CURRENT.tmp");
        let mut file = File::create(&temp)?;
        file.write_all(name.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp, self.current_path())?;

        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    /// Removes snapshot generations older than `current - keep`.
    /// Retained generations serve as a manual fallback. Failures are
    /// logged and ignored; stale files are harmless.
    fn prune(&self, current: u64) {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in read_dir.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(generation) = parse_snapshot_name(name) else {
                continue;
            };
            if generation + (self.keep as u64) < current {
                if let Err(error) = fs::remove_file(entry.path()) {
                    warn!(%error, file = name, "failed to prune old snapshot");
                }
            }
        }
    }
}

fn parse_snapshot_name(name: &str) -> Option<u64> {
    let rest = name.strip_prefix("snapshot-")?;
    let digits = rest.strip_suffix(".dat")?;
    digits.parse().ok()
}

fn encode_snapshot(snapshot: &Snapshot) -> Vec<u8> {
    let mut keys: Vec<&String> = snapshot.entries.keys().collect();
    keys.sort();

    let entries_size: usize = keys.iter().map(|k| 2 + k.len() + FINGERPRINT_LEN).sum();
    let mut data = Vec::with_capacity(HEADER_SIZE + entries_size + FOOTER_SIZE);

    data.extend_from_slice(&SNAPSHOT_MAGIC);
    data.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    data.extend_from_slice(&snapshot.generation.to_le_bytes());
    data.extend_from_slice(&(keys.len() as u32).to_le_bytes());

    for key in keys {
        data.extend_from_slice(&(key.len() as u16).to_le_bytes());
        data.extend_from_slice(key.as_bytes());
        data.extend_from_slice(&snapshot.entries[key]);
    }

    let checksum = compute_crc32(&data);
    data.extend_from_slice(&checksum.to_le_bytes());
    data
}

fn decode_snapshot(data: &[u8]) -> SyncResult<Snapshot> {
    let corrupt = |msg: &str| SyncError::SnapshotCorruption(msg.to_string());

    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(corrupt("snapshot file too small"));
    }
    if data[0..4] != SNAPSHOT_MAGIC {
        return Err(corrupt("invalid snapshot magic"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(SyncError::SnapshotCorruption(format!(
            "unsupported snapshot version: {version}"
        )));
    }
    let generation = u64::from_le_bytes(data[6..14].try_into().unwrap_or([0; 8]));
    let count = u32::from_le_bytes([data[14], data[15], data[16], data[17]]) as usize;

    let checksum_offset = data.len() - FOOTER_SIZE;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    let computed = compute_crc32(&data[..checksum_offset]);
    if stored != computed {
        return Err(SyncError::SnapshotCorruption(format!(
            "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let mut entries = HashMap::with_capacity(count);
    let mut offset = HEADER_SIZE;
    while offset < checksum_offset {
        if offset + 2 > checksum_offset {
            return Err(corrupt("truncated entry key length"));
        }
        let key_len = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;
        if offset + key_len + FINGERPRINT_LEN > checksum_offset {
            return Err(corrupt("truncated snapshot entry"));
        }
        let key = std::str::from_utf8(&data[offset..offset + key_len])
            .map_err(|_| corrupt("snapshot key is not UTF-8"))?
            .to_string();
        offset += key_len;
        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(&data[offset..offset + FINGERPRINT_LEN]);
        offset += FINGERPRINT_LEN;
        entries.insert(key, fingerprint);
    }

    if entries.len() != count {
        return Err(SyncError::SnapshotCorruption(format!(
            "entry count mismatch: expected {count}, got {}",
            entries.len()
        )));
    }

    Ok(Snapshot {
        generation,
        entries,
    })
}
