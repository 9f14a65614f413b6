//! # CountySync Engine
//!
//! Delta-synchronization engine for CountySync.
//!
//! This crate provides:
//! - Record fingerprinting (SHA-256 over canonicalized content)
//! - A durable snapshot store (key → fingerprint baseline)
//! - Change classification (added / updated / deleted / unchanged)
//! - A transactional applier over the three target stores
//! - An append-only audit log of run results
//! - The sync orchestrator state machine
//!
//! ## Architecture
//!
//! One run moves through a fixed sequence of states:
//!
//! ```text
//! Idle → Fingerprinting → Classifying → Staging → Committing
//!                                          │            │
//!                                          ▼            ▼
//!                                     RolledBack    Completed
//! ```
//!
//! ## Key Invariants
//!
//! - The four change categories partition the key union exactly
//! - All three stores stage before any store promotes
//! - A staging failure leaves live stores and the snapshot untouched
//! - Snapshot promotion is the last step of a commit, so a crash
//!   mid-commit is deterministically recoverable at next startup
//! - Unchanged records are never rewritten

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod audit;
mod classify;
mod config;
mod dir;
mod error;
mod fingerprint;
mod snapshot;
mod state;
mod store;
mod sync;

pub use applier::TransactionalApplier;
pub use audit::{AuditLog, RunOutcome, RunResult};
pub use classify::{classify, ChangeSet};
pub use config::SyncConfig;
pub use dir::OutputDir;
pub use error::{SyncError, SyncResult};
pub use fingerprint::{fingerprint_batch, fingerprint_record, Fingerprint, FINGERPRINT_LEN};
pub use snapshot::{Snapshot, SnapshotStore};
pub use state::SyncState;
pub use store::{compute_crc32, FileStore, StoreKind, TargetStore};
pub use sync::{SyncEngine, VerifyReport};
