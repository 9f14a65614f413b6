//! Dynamic attribute value type.

use serde::{Deserialize, Serialize};

/// Scale used when rounding float attributes for canonicalization.
///
/// Six decimal places: anything below this precision is treated as
/// floating-point round-trip noise and collapses to the same canonical
/// form.
pub const FLOAT_SCALE: f64 = 1_000_000.0;

/// A dynamic scalar attribute value.
///
/// This type represents any attribute value CountySync accepts from
/// the extraction collaborator. Nested structures are intentionally
/// not supported: parcel attributes are a flat set of scalars.
///
/// Variant order matters for deserialization: untagged matching tries
/// `Integer` before `Float`, so JSON `3` stays an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Null value.
    Null,
}

impl AttrValue {
    /// Returns the canonical textual form used for fingerprinting.
    ///
    /// Two values that differ only by floating-point formatting noise
    /// below [`FLOAT_SCALE`] precision produce the same canonical
    /// text. Negative zero normalizes to zero.
    pub fn canonical_text(&self) -> String {
        match self {
            AttrValue::Null => "null".to_string(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Integer(n) => n.to_string(),
            AttrValue::Float(f) => {
                let rounded = (f * FLOAT_SCALE).round() / FLOAT_SCALE;
                // Collapse -0.0 into 0.0
                let rounded = if rounded == 0.0 { 0.0 } else { rounded };
                format!("{rounded:.6}")
            }
            AttrValue::Text(s) => s.clone(),
        }
    }

    /// Returns a short name for the value's kind, for error reporting.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Integer(_) => "integer",
            AttrValue::Float(_) => "float",
            AttrValue::Text(_) => "text",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Returns true if the value is a finite number or not a number
    /// at all.
    ///
    /// NaN and infinities have no canonical form and are rejected at
    /// schema validation.
    pub fn is_finite(&self) -> bool {
        match self {
            AttrValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Integer(n)
    }
}

impl From<i32> for AttrValue {
    fn from(n: i32) -> Self {
        AttrValue::Integer(i64::from(n))
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}
