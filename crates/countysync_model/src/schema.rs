//! Per-run attribute schema.
//!
//! The extraction collaborator hands over loosely-typed tabular data.
//! Rather than letting ambiguous types flow into fingerprinting, each
//! run carries an explicit schema: an ordered list of typed field
//! descriptors validated once at batch ingestion.

use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};

/// The declared kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Integer,
    /// Floating-point number.
    Float,
    /// Text string.
    Text,
}

impl AttrKind {
    /// Returns a short name for error reporting.
    pub fn name(self) -> &'static str {
        match self {
            AttrKind::Bool => "bool",
            AttrKind::Integer => "integer",
            AttrKind::Float => "float",
            AttrKind::Text => "text",
        }
    }

    fn matches(self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (AttrKind::Bool, AttrValue::Bool(_))
                | (AttrKind::Integer, AttrValue::Integer(_))
                | (AttrKind::Float, AttrValue::Float(_))
                | (AttrKind::Float, AttrValue::Integer(_))
                | (AttrKind::Text, AttrValue::Text(_))
        )
    }
}

/// Describes one attribute of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Attribute name.
    pub name: String,
    /// Declared kind.
    pub kind: AttrKind,
    /// Whether the attribute must be present and non-null.
    pub required: bool,
    /// Whether the attribute is projected into the statistics store.
    pub in_stats: bool,
    /// Whether the attribute is projected into the working store.
    pub in_working: bool,
}

impl FieldDescriptor {
    /// Creates an optional field with no store projections.
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            in_stats: false,
            in_working: false,
        }
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Projects the field into the statistics store.
    pub fn stats(mut self) -> Self {
        self.in_stats = true;
        self
    }

    /// Projects the field into the working store.
    pub fn working(mut self) -> Self {
        self.in_working = true;
        self
    }
}

/// An ordered list of typed field descriptors for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Creates a schema from a list of field descriptors.
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// The default county parcel schema.
    ///
    /// Field split between the statistics and working stores follows
    /// the downstream consumers: stats gets the aggregate-friendly
    /// numeric and categorical columns, working gets the editable ones.
    pub fn parcel_default() -> Self {
        Self::new(vec![
            FieldDescriptor::new("owner", AttrKind::Text)
                .required()
                .working(),
            FieldDescriptor::new("use_code", AttrKind::Text)
                .required()
                .stats()
                .working(),
            FieldDescriptor::new("acres", AttrKind::Float).required().stats(),
            FieldDescriptor::new("assessed_value", AttrKind::Integer)
                .required()
                .stats(),
            FieldDescriptor::new("address", AttrKind::Text),
            FieldDescriptor::new("city", AttrKind::Text),
            FieldDescriptor::new("zoning_code", AttrKind::Text),
            FieldDescriptor::new("year_built", AttrKind::Integer),
        ])
    }

    /// Returns the field descriptors in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the fields projected into the statistics store.
    pub fn stats_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.in_stats)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Names of the fields projected into the working store.
    pub fn working_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.in_working)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Validates a single record against this schema.
    ///
    /// Checks, in order: non-empty key, all attributes declared, kinds
    /// match, numbers finite, required fields present and non-null.
    /// Geometry is canonicalized by the caller ([`crate::RecordBatch`]).
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate_record(&self, record: &Record) -> ModelResult<()> {
        if record.key().is_empty() {
            return Err(ModelError::MissingKey);
        }

        for (name, value) in record.attrs() {
            let field = self
                .field(name)
                .ok_or_else(|| ModelError::UndeclaredField {
                    field: name.clone(),
                })?;
            if !value.is_finite() {
                return Err(ModelError::NonFiniteNumber {
                    field: name.clone(),
                });
            }
            if !value.is_null() && !field.kind.matches(value) {
                return Err(ModelError::KindMismatch {
                    field: name.clone(),
                    expected: field.kind.name(),
                    actual: value.kind_name(),
                });
            }
        }

        for field in &self.fields {
            if field.required {
                match record.attr(&field.name) {
                    Some(v) if !v.is_null() => {}
                    _ => {
                        return Err(ModelError::MissingField {
                            field: field.name.clone(),
                        })
                    }
                }
            }
        }

        Ok(())
    }
}
