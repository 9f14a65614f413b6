//! Record fingerprinting.
//!
//! A fingerprint is a SHA-256 digest over a record's canonicalized
//! content: attributes sorted by name, each value in its canonical
//! textual form, followed by the canonical geometry coordinate stream.
//! Two records with identical semantic content always produce the same
//! fingerprint regardless of attribute order or float formatting noise;
//! any semantic difference changes the digest.

use crate::error::SyncResult;
use countysync_model::{Record, RecordBatch};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Length of a fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// A fixed-size content digest of one record.
pub type Fingerprint = [u8; FINGERPRINT_LEN];

/// Computes the fingerprint of a single record.
///
/// The record's attributes iterate in name order (the model guarantees
/// this), and its geometry must already be canonical, which batch
/// validation guarantees.
///
/// # Errors
///
/// Returns a model error if the geometry cannot produce a canonical
/// byte stream (not reachable for validated batches).
pub fn fingerprint_record(record: &Record) -> SyncResult<Fingerprint> {
    let mut hasher = Sha256::new();
    for (name, value) in record.attrs() {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.canonical_text().as_bytes());
        hasher.update([0u8]);
    }
    if let Some(geometry) = &record.geometry {
        let mut buf = Vec::new();
        geometry.write_canonical_bytes(&mut buf)?;
        hasher.update(&buf);
    }
    Ok(hasher.finalize().into())
}

/// Computes fingerprints for every record of a validated batch.
///
/// Work proceeds in chunks of `chunk_size` records, matching the
/// batch-size hint passed in by the caller.
pub fn fingerprint_batch(
    batch: &RecordBatch,
    chunk_size: usize,
) -> SyncResult<HashMap<String, Fingerprint>> {
    let chunk_size = chunk_size.max(1);
    let mut fingerprints = HashMap::with_capacity(batch.len());
    for chunk in batch.records().chunks(chunk_size) {
        for record in chunk {
            fingerprints.insert(record.key().to_string(), fingerprint_record(record)?);
        }
        debug!(done = fingerprints.len(), total = batch.len(), "fingerprinted chunk");
    }
    Ok(fingerprints)
}

/// Renders a fingerprint as lowercase hex, for logs and debugging.
pub fn hex(fingerprint: &Fingerprint) -> String {
    fingerprint.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use countysync_model::{Geometry, Ring, Schema};

    fn parcel(key: &str) -> Record {
        Record::new(key)
            .with_attr("owner", "Alice")
            .with_attr("use_code", "RES")
            .with_attr("acres", 1.5)
            .with_attr("assessed_value", 150_000i64)
    }

    #[test]
    fn identical_records_match() {
        let a = fingerprint_record(&parcel("P-1")).unwrap();
        let b = fingerprint_record(&parcel("P-1")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn attribute_insertion_order_is_irrelevant() {
        let a = Record::new("P-1")
            .with_attr("owner", "Alice")
            .with_attr("use_code", "RES");
        let b = Record::new("P-1")
            .with_attr("use_code", "RES")
            .with_attr("owner", "Alice");
        assert_eq!(
            fingerprint_record(&a).unwrap(),
            fingerprint_record(&b).unwrap()
        );
    }

    #[test]
    fn value_changes_are_detected() {
        let a = parcel("P-1");
        let b = parcel("P-1").with_attr("owner", "Bob");
        assert_ne!(
            fingerprint_record(&a).unwrap(),
            fingerprint_record(&b).unwrap()
        );
    }

    #[test]
    fn float_noise_is_ignored() {
        let a = parcel("P-1").with_attr("acres", 1.5);
        let b = parcel("P-1").with_attr("acres", 1.500_000_000_2);
        assert_eq!(
            fingerprint_record(&a).unwrap(),
            fingerprint_record(&b).unwrap()
        );
    }

    #[test]
    fn equivalent_ring_orderings_match() {
        let a = parcel("P-1").with_geometry(Geometry::Polygon {
            rings: vec![Ring(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])],
        });
        // Same square: different start vertex, opposite winding
        let b = parcel("P-1").with_geometry(Geometry::Polygon {
            rings: vec![Ring(vec![(1.0, 1.0), (1.0, 0.0), (0.0, 0.0), (0.0, 1.0)])],
        });
        assert_eq!(
            fingerprint_record(&a).unwrap(),
            fingerprint_record(&b).unwrap()
        );
    }

    #[test]
    fn geometry_presence_changes_fingerprint() {
        let a = parcel("P-1");
        let b = parcel("P-1").with_geometry(Geometry::Point { x: 1.0, y: 2.0 });
        assert_ne!(
            fingerprint_record(&a).unwrap(),
            fingerprint_record(&b).unwrap()
        );
    }

    #[test]
    fn batch_fingerprints_every_record() {
        let batch = RecordBatch::validate(
            Schema::parcel_default(),
            vec![parcel("P-1"), parcel("P-2"), parcel("P-3")],
        );
        let fps = fingerprint_batch(&batch, 2).unwrap();
        assert_eq!(fps.len(), 3);
        assert!(fps.contains_key("P-1"));
        assert!(fps.contains_key("P-3"));
    }

    #[test]
    fn hex_rendering() {
        let fp = [0u8; FINGERPRINT_LEN];
        assert_eq!(hex(&fp).len(), 64);
        assert!(hex(&fp).chars().all(|c| c == '0'));
    }
}
