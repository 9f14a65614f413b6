//! Change classification.
//!
//! Diffs the new fingerprint mapping against the previous snapshot to
//! produce the four-way change set. Classification is exact-fingerprint
//! equality only; no partial or fuzzy matching.

use crate::fingerprint::Fingerprint;
use std::collections::{BTreeSet, HashMap};

/// The four disjoint key sets produced by one classification.
///
/// Invariant: the sets partition the union of new-input keys and
/// snapshot keys, each key appearing exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Keys present in the new input but absent from the snapshot.
    pub added: BTreeSet<String>,
    /// Keys present in both with differing fingerprints.
    pub updated: BTreeSet<String>,
    /// Keys present in the snapshot but absent from the new input.
    pub deleted: BTreeSet<String>,
    /// Keys present in both with equal fingerprints.
    pub unchanged: BTreeSet<String>,
}

impl ChangeSet {
    /// Total number of classified keys.
    pub fn total(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len() + self.unchanged.len()
    }

    /// True if nothing needs to be written.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// True if the key must be written (added or updated) this run.
    pub fn is_write(&self, key: &str) -> bool {
        self.added.contains(key) || self.updated.contains(key)
    }
}

/// Classifies the new fingerprint mapping against the previous one.
///
/// Single linear pass: the new mapping streams against the previous
/// one, then leftover snapshot keys are collected as deleted. O(n + m)
/// time; auxiliary space is bounded by the output.
///
/// An empty previous snapshot classifies every new key as added
/// (bootstrap); an empty new input classifies every snapshot key as
/// deleted.
pub fn classify(
    new: &HashMap<String, Fingerprint>,
    previous: &HashMap<String, Fingerprint>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (key, fingerprint) in new {
        match previous.get(key) {
            None => {
                changes.added.insert(key.clone());
            }
            Some(prev) if prev == fingerprint => {
                changes.unchanged.insert(key.clone());
            }
            Some(_) => {
                changes.updated.insert(key.clone());
            }
        }
    }

    for key in previous.keys() {
        if !new.contains_key(key) {
            changes.deleted.insert(key.clone());
        }
    }

    changes
}
