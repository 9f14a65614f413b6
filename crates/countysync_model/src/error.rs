//! Error types for the data model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating records against a schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The record has no key, or an empty key.
    #[error("record is missing its key attribute")]
    MissingKey,

    /// The same key appears more than once within a single batch.
    #[error("duplicate key in batch: {key}")]
    DuplicateKey {
        /// The duplicated key.
        key: String,
    },

    /// A required field is absent or null.
    #[error("required field missing: {field}")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A field value does not match its declared kind.
    #[error("field {field} has kind {actual}, expected {expected}")]
    KindMismatch {
        /// Name of the offending field.
        field: String,
        /// Declared kind.
        expected: &'static str,
        /// Kind actually present.
        actual: &'static str,
    },

    /// A numeric field holds NaN or an infinity.
    #[error("field {field} is not a finite number")]
    NonFiniteNumber {
        /// Name of the offending field.
        field: String,
    },

    /// The record carries a field the schema does not declare.
    #[error("field not declared in schema: {field}")]
    UndeclaredField {
        /// Name of the undeclared field.
        field: String,
    },

    /// The geometry cannot be canonicalized.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}
