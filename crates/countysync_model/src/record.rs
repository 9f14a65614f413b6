//! Records and validated batches.

use crate::error::ModelError;
use crate::geometry::Geometry;
use crate::schema::{AttrKind, Schema};
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

/// One logical entity (a parcel).
///
/// Attributes live in a `BTreeMap`, so iteration order is always by
/// name regardless of the order the source delivered the columns in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable external identifier, unique within a run's input.
    pub key: String,
    /// Flat attribute set.
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
    /// Optional spatial shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl Record {
    /// Creates a record with the given key and no attributes.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attrs: BTreeMap::new(),
            geometry: None,
        }
    }

    /// Adds or replaces an attribute (builder style).
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Attaches a geometry (builder style).
    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Returns the record key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the attributes, iterated in name order.
    pub fn attrs(&self) -> btree_map::Iter<'_, String, AttrValue> {
        self.attrs.iter()
    }

    /// Looks up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }
}

/// A record rejected during batch validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position of the record in the input sequence.
    pub index: usize,
    /// The record key, if it had one.
    pub key: Option<String>,
    /// Why the record was rejected.
    #[serde(skip)]
    pub error: Option<ModelError>,
    /// Human-readable reason (kept for the audit trail).
    pub reason: String,
}

/// A validated batch of records for one run.
///
/// Validation happens exactly once, at ingestion: schema violations
/// and duplicate keys are quarantined into [`RecordBatch::rejected`],
/// surviving geometries are replaced with their canonical form, and
/// integer values on float-declared fields are widened to floats so
/// `2` and `2.0` canonicalize identically. Everything downstream
/// (fingerprinting, classification, staging) can assume the batch is
/// clean.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    schema: Schema,
    records: Vec<Record>,
    rejected: Vec<RejectedRecord>,
}

impl RecordBatch {
    /// Validates `records` against `schema`, quarantining violations.
    ///
    /// A key that appears more than once marks *every* record bearing
    /// it as malformed; no instance is silently chosen.
    pub fn validate(schema: Schema, records: Vec<Record>) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            *counts.entry(record.key()).or_insert(0) += 1;
        }
        let duplicates: std::collections::HashSet<String> = counts
            .iter()
            .filter(|(key, n)| **n > 1 && !key.is_empty())
            .map(|(key, _)| (*key).to_string())
            .collect();

        let mut accepted = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for (index, mut record) in records.into_iter().enumerate() {
            let verdict = if duplicates.contains(record.key()) {
                Err(ModelError::DuplicateKey {
                    key: record.key().to_string(),
                })
            } else {
                schema.validate_record(&record).and_then(|()| {
                    for (name, value) in record.attrs.iter_mut() {
                        if let AttrValue::Integer(n) = *value {
                            if schema.field(name).map(|f| f.kind) == Some(AttrKind::Float) {
                                *value = AttrValue::Float(n as f64);
                            }
                        }
                    }
                    if let Some(geometry) = &record.geometry {
                        record.geometry = Some(geometry.canonicalize()?);
                    }
                    Ok(())
                })
            };

            match verdict {
                Ok(()) => accepted.push(record),
                Err(error) => {
                    let key = if record.key().is_empty() {
                        None
                    } else {
                        Some(record.key().to_string())
                    };
                    rejected.push(RejectedRecord {
                        index,
                        key,
                        reason: error.to_string(),
                        error: Some(error),
                    });
                }
            }
        }

        Self {
            schema,
            records: accepted,
            rejected,
        }
    }

    /// Returns the schema the batch was validated against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the accepted records.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the quarantined records.
    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }

    /// Number of accepted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no records survived validation.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
