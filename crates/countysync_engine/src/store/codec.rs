//! Store file format and projection encoding.
//!
//! Store files are a series of length-prefixed entries with a header
//! and a CRC-32 footer:
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | entry_count (4) | entries... | crc32 (4) |
//! ```
//!
//! Each entry:
//!
//! ```text
//! | key_len (2) | key bytes | payload_len (4) | payload bytes |
//! ```
//!
//! Entries are written in key order, so a given entry set always
//! produces the same bytes.

use crate::error::{SyncError, SyncResult};
use crate::store::StoreKind;
use countysync_model::Record;
use std::collections::BTreeMap;

/// Magic bytes for store files.
const STORE_MAGIC: [u8; 4] = *b"CSST";
/// Current store format version.
const STORE_VERSION: u16 = 1;
/// Header size (magic + version + kind + entry_count).
const HEADER_SIZE: usize = 4 + 2 + 1 + 4;
/// Footer size (checksum).
const FOOTER_SIZE: usize = 4;

/// Computes the CRC-32 (IEEE polynomial) of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// Serializes an entry set into store file bytes.
pub fn encode_entries(kind: StoreKind, entries: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let entries_size: usize = entries
        .iter()
        .map(|(k, v)| 2 + k.len() + 4 + v.len())
        .sum();
    let mut data = Vec::with_capacity(HEADER_SIZE + entries_size + FOOTER_SIZE);

    data.extend_from_slice(&STORE_MAGIC);
    data.extend_from_slice(&STORE_VERSION.to_le_bytes());
    data.push(kind.tag());
    data.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for (key, payload) in entries {
        data.extend_from_slice(&(key.len() as u16).to_le_bytes());
        data.extend_from_slice(key.as_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(payload);
    }

    let checksum = compute_crc32(&data);
    data.extend_from_slice(&checksum.to_le_bytes());
    data
}

/// Parses store file bytes back into an entry set.
///
/// # Errors
///
/// Returns [`SyncError::InvalidFormat`] for bad magic, version, kind,
/// or truncated entries, and [`SyncError::ChecksumMismatch`] if the
/// footer does not match.
pub fn decode_entries(kind: StoreKind, data: &[u8]) -> SyncResult<BTreeMap<String, Vec<u8>>> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(SyncError::invalid_format("store file too small"));
    }
    if data[0..4] != STORE_MAGIC {
        return Err(SyncError::invalid_format("invalid store magic"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != STORE_VERSION {
        return Err(SyncError::invalid_format(format!(
            "unsupported store version: {version}"
        )));
    }
    if data[6] != kind.tag() {
        return Err(SyncError::invalid_format(format!(
            "store file kind tag {} does not match {} store",
            data[6], kind
        )));
    }
    let entry_count = u32::from_le_bytes([data[7], data[8], data[9], data[10]]) as usize;

    let checksum_offset = data.len() - FOOTER_SIZE;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    let computed = compute_crc32(&data[..checksum_offset]);
    if stored != computed {
        return Err(SyncError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    let mut entries = BTreeMap::new();
    let mut offset = HEADER_SIZE;
    while offset < checksum_offset {
        if offset + 2 > checksum_offset {
            return Err(SyncError::invalid_format("truncated entry key length"));
        }
        let key_len = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;
        if offset + key_len + 4 > checksum_offset {
            return Err(SyncError::invalid_format("truncated entry key"));
        }
        let key = std::str::from_utf8(&data[offset..offset + key_len])
            .map_err(|_| SyncError::invalid_format("entry key is not UTF-8"))?
            .to_string();
        offset += key_len;
        let payload_len = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;
        if offset + payload_len > checksum_offset {
            return Err(SyncError::invalid_format("entry extends beyond data"));
        }
        entries.insert(key, data[offset..offset + payload_len].to_vec());
        offset += payload_len;
    }

    if entries.len() != entry_count {
        return Err(SyncError::invalid_format(format!(
            "entry count mismatch: expected {}, got {}",
            entry_count,
            entries.len()
        )));
    }

    Ok(entries)
}

/// Encodes a record's projection for one store.
///
/// The payload carries the selected attributes (name and canonical
/// value, NUL-separated) and, when requested, the canonical geometry
/// stream. The record key is not part of the payload; entries are
/// keyed externally.
pub fn encode_projection(
    record: &Record,
    fields: &[&str],
    include_geometry: bool,
) -> SyncResult<Vec<u8>> {
    let mut payload = Vec::new();
    for (name, value) in record.attrs() {
        if !fields.contains(&name.as_str()) {
            continue;
        }
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(value.canonical_text().as_bytes());
        payload.push(0);
    }
    if include_geometry {
        if let Some(geometry) = &record.geometry {
            geometry.write_canonical_bytes(&mut payload)?;
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([
            ("P-1".to_string(), b"alpha".to_vec()),
            ("P-2".to_string(), b"beta".to_vec()),
        ])
    }

    #[test]
    fn encode_decode_round_trip() {
        let entries = sample_entries();
        let data = encode_entries(StoreKind::Spatial, &entries);
        let decoded = decode_entries(StoreKind::Spatial, &data).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_entry_set() {
        let entries = BTreeMap::new();
        let data = encode_entries(StoreKind::Stats, &entries);
        let decoded = decode_entries(StoreKind::Stats, &data).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_entries(StoreKind::Working, &sample_entries());
        let b = encode_entries(StoreKind::Working, &sample_entries());
        assert_eq!(a, b);
    }

    #[test]
    fn corruption_is_detected() {
        let mut data = encode_entries(StoreKind::Spatial, &sample_entries());
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        assert!(matches!(
            decode_entries(StoreKind::Spatial, &data),
            Err(SyncError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn wrong_kind_rejected() {
        let data = encode_entries(StoreKind::Spatial, &sample_entries());
        assert!(matches!(
            decode_entries(StoreKind::Stats, &data),
            Err(SyncError::InvalidFormat(_))
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut data = encode_entries(StoreKind::Spatial, &sample_entries());
        data[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            decode_entries(StoreKind::Spatial, &data),
            Err(SyncError::InvalidFormat(_))
        ));
    }

    #[test]
    fn too_small_rejected() {
        assert!(decode_entries(StoreKind::Spatial, &[0u8; 6]).is_err());
    }

    #[test]
    fn projection_selects_fields() {
        let record = Record::new("P-1")
            .with_attr("owner", "Alice")
            .with_attr("use_code", "RES")
            .with_attr("acres", 1.5);

        let stats = encode_projection(&record, &["use_code", "acres"], false).unwrap();
        let working = encode_projection(&record, &["owner", "use_code"], false).unwrap();
        assert_ne!(stats, working);

        let text = String::from_utf8_lossy(&stats).to_string();
        assert!(text.contains("use_code"));
        assert!(!text.contains("owner"));
    }

    #[test]
    fn crc32_known_value() {
        // CRC-32 of "123456789" is the standard check value
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }
}
