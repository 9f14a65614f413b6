//! # CountySync Model
//!
//! Record, schema, and geometry data model for CountySync.
//!
//! This crate is the leaf of the workspace: it defines what a parcel
//! record *is*, independent of how records are fingerprinted, diffed,
//! or persisted.
//!
//! ## Design Principles
//!
//! - Attribute values are dynamic but typed ([`AttrValue`]), with an
//!   explicit per-run [`Schema`] validated once at batch ingestion
//! - Canonicalization is part of the model: equivalent values and
//!   geometries have a single canonical form, so downstream hashing
//!   never sees formatting noise
//! - Records that violate the schema are quarantined at validation,
//!   never propagated
//!
//! ## Example
//!
//! ```rust
//! use countysync_model::{AttrValue, Record, RecordBatch, Schema};
//!
//! let schema = Schema::parcel_default();
//! let record = Record::new("P-0001")
//!     .with_attr("owner", AttrValue::Text("Alice".into()))
//!     .with_attr("use_code", AttrValue::Text("RES".into()))
//!     .with_attr("acres", AttrValue::Float(1.5))
//!     .with_attr("assessed_value", AttrValue::Integer(150_000));
//! let batch = RecordBatch::validate(schema, vec![record]);
//! assert_eq!(batch.records().len(), 1);
//! assert!(batch.rejected().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod geometry;
mod record;
mod schema;
mod value;

pub use error::{ModelError, ModelResult};
pub use geometry::{Geometry, Ring, COORD_SCALE};
pub use record::{Record, RecordBatch, RejectedRecord};
pub use schema::{AttrKind, FieldDescriptor, Schema};
pub use value::{AttrValue, FLOAT_SCALE};
