//! Canonical spatial shapes.
//!
//! Geometry arrives from the transformation collaborator already parsed
//! (WKT handling is not this system's concern). What this module owns is
//! *canonicalization*: equivalent geometries expressed with different
//! vertex orderings, winding, or trailing coordinate precision must end
//! up byte-identical, so fingerprinting never reports a spurious change.
//!
//! Canonical form:
//! - coordinates rounded to [`COORD_SCALE`] precision (1e-6 degrees)
//! - rings open (no repeated closing vertex), at least 3 distinct vertices
//! - rings wound counter-clockwise
//! - rings rotated to start at their lexicographically smallest vertex

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Scale used when rounding coordinates for canonicalization.
pub const COORD_SCALE: f64 = 1_000_000.0;

/// One ring of a polygon: an ordered list of `(x, y)` vertices.
///
/// In canonical form the ring is open; the closing vertex is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ring(pub Vec<(f64, f64)>);

/// A canonical spatial shape attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    /// A single point.
    Point {
        /// Longitude.
        x: f64,
        /// Latitude.
        y: f64,
    },
    /// A polygon: one outer ring and zero or more holes.
    Polygon {
        /// Rings, outer ring first.
        rings: Vec<Ring>,
    },
}

/// Rounds a coordinate to the fixed scale and converts it to a scaled
/// integer, rejecting non-finite input.
fn scaled(c: f64) -> ModelResult<i64> {
    if !c.is_finite() {
        return Err(ModelError::InvalidGeometry(
            "non-finite coordinate".to_string(),
        ));
    }
    let s = (c * COORD_SCALE).round();
    if s.abs() >= i64::MAX as f64 {
        return Err(ModelError::InvalidGeometry(
            "coordinate out of range".to_string(),
        ));
    }
    Ok(s as i64)
}

impl Ring {
    /// Canonicalizes the ring into scaled-integer vertices.
    ///
    /// Deduplicates consecutive vertices (including the closing
    /// vertex), normalizes winding to counter-clockwise, and rotates
    /// the ring to start at its smallest vertex.
    fn canonical_vertices(&self) -> ModelResult<Vec<(i64, i64)>> {
        let mut verts: Vec<(i64, i64)> = Vec::with_capacity(self.0.len());
        for &(x, y) in &self.0 {
            let v = (scaled(x)?, scaled(y)?);
            if verts.last() != Some(&v) {
                verts.push(v);
            }
        }
        // Drop the closing vertex if the ring came in closed
        if verts.len() > 1 && verts.first() == verts.last() {
            verts.pop();
        }
        if verts.len() < 3 {
            return Err(ModelError::InvalidGeometry(
                "ring has fewer than 3 distinct vertices".to_string(),
            ));
        }

        // Shoelace sum; i128 so large coordinates cannot overflow
        let mut area2: i128 = 0;
        for i in 0..verts.len() {
            let (x1, y1) = verts[i];
            let (x2, y2) = verts[(i + 1) % verts.len()];
            area2 += i128::from(x1) * i128::from(y2) - i128::from(x2) * i128::from(y1);
        }
        if area2 == 0 {
            return Err(ModelError::InvalidGeometry(
                "ring is degenerate (zero area)".to_string(),
            ));
        }
        if area2 < 0 {
            verts.reverse();
        }

        // Rotate so the smallest vertex comes first
        let min_idx = verts
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap_or(0);
        verts.rotate_left(min_idx);

        Ok(verts)
    }
}

impl Geometry {
    /// Returns the canonical form of this geometry.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidGeometry`] for non-finite
    /// coordinates, degenerate rings, or polygons without rings.
    pub fn canonicalize(&self) -> ModelResult<Geometry> {
        match self {
            Geometry::Point { x, y } => {
                let sx = scaled(*x)?;
                let sy = scaled(*y)?;
                Ok(Geometry::Point {
                    x: sx as f64 / COORD_SCALE,
                    y: sy as f64 / COORD_SCALE,
                })
            }
            Geometry::Polygon { rings } => {
                if rings.is_empty() {
                    return Err(ModelError::InvalidGeometry(
                        "polygon has no rings".to_string(),
                    ));
                }
                let mut out = Vec::with_capacity(rings.len());
                for ring in rings {
                    let verts = ring.canonical_vertices()?;
                    out.push(Ring(
                        verts
                            .into_iter()
                            .map(|(x, y)| (x as f64 / COORD_SCALE, y as f64 / COORD_SCALE))
                            .collect(),
                    ));
                }
                Ok(Geometry::Polygon { rings: out })
            }
        }
    }

    /// Appends the canonical coordinate stream to `out`.
    ///
    /// Coordinates are emitted as scaled little-endian integers, so
    /// the stream is exact and platform-independent. The geometry must
    /// already be canonical (this is guaranteed after batch
    /// validation).
    pub fn write_canonical_bytes(&self, out: &mut Vec<u8>) -> ModelResult<()> {
        match self {
            Geometry::Point { x, y } => {
                out.push(1);
                out.extend_from_slice(&scaled(*x)?.to_le_bytes());
                out.extend_from_slice(&scaled(*y)?.to_le_bytes());
            }
            Geometry::Polygon { rings } => {
                out.push(2);
                out.extend_from_slice(&(rings.len() as u32).to_le_bytes());
                for ring in rings {
                    let verts = ring.canonical_vertices()?;
                    out.extend_from_slice(&(verts.len() as u32).to_le_bytes());
                    for (x, y) in verts {
                        out.extend_from_slice(&x.to_le_bytes());
                        out.extend_from_slice(&y.to_le_bytes());
                    }
                }
            }
        }
        Ok(())
    }
}
