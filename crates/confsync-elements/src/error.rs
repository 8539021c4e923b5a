//! Element model error types
//!
//! Structural errors raised by the value-tree algorithms. Resolution misses are
//! not errors: see [`crate::resolver::Resolution`].

use thiserror::Error;

use crate::ids::ElemId;

/// Error that can occur while walking, rendering or converting value trees.
#[derive(Debug, Error)]
pub enum ElementError {
    /// A value's concrete shape disagrees with its declared type.
    #[error("schema mismatch at {path}: expected {expected}, found {actual}")]
    SchemaMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A template or reference was rendered before it was resolved.
    #[error("unresolved reference to {elem_id}")]
    UnresolvedReference { elem_id: String },

    /// A resolved reference holds a value that cannot be rendered into a string.
    #[error("invalid value inside a template expression {elem_id}: {message}")]
    InvalidTemplateValue { elem_id: String, message: String },

    /// An element identifier could not be parsed.
    #[error("invalid element id: {id}")]
    InvalidElemId { id: String },

    /// A type referenced by name is not part of the registry.
    #[error("unknown type: {type_name}")]
    UnknownType { type_name: String },
}

impl ElementError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ElementError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            ElementError::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
            ElementError::InvalidTemplateValue { .. } => "INVALID_TEMPLATE_VALUE",
            ElementError::InvalidElemId { .. } => "INVALID_ELEM_ID",
            ElementError::UnknownType { .. } => "UNKNOWN_TYPE",
        }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(
        path: &ElemId,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ElementError::SchemaMismatch {
            path: path.full_name(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an unresolved reference error.
    pub fn unresolved(elem_id: &ElemId) -> Self {
        ElementError::UnresolvedReference {
            elem_id: elem_id.full_name(),
        }
    }

    /// Create an invalid template value error.
    pub fn invalid_template_value(elem_id: &ElemId, message: impl Into<String>) -> Self {
        ElementError::InvalidTemplateValue {
            elem_id: elem_id.full_name(),
            message: message.into(),
        }
    }
}

/// Result type for element operations.
pub type ElementResult<T> = Result<T, ElementError>;
