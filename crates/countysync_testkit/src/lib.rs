//! # CountySync Testkit
//!
//! Deterministic parcel data generation and fault injection for
//! exercising the sync engine. The generators also back the CLI's
//! `generate` command.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod faults;
mod generators;

pub use faults::{FailingStore, FaultMode};
pub use generators::{ParcelGenerator, USE_CODES};
