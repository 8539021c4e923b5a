//! # Element Model
//!
//! Data model and generic value-tree algorithms shared by every confsync
//! adapter.
//!
//! Elements are typed configuration units (object types and their instances)
//! identified by path-like [`ElemId`](ids::ElemId)s. Instance values are
//! nested [`Value`](value::Value) trees whose leaves may be references to
//! other elements or templates mixing literals and references.
//!
//! ## Crate Organization
//!
//! - [`ids`] - Element identifiers
//! - [`value`] - Value trees and JSON conversion
//! - [`reference`] - Cross-element references
//! - [`template`] - Template expressions and extraction from text
//! - [`schema`] - Object types, field definitions and the type registry
//! - [`element`] - Instances, elements and element sources
//! - [`change`] - Before/after change model
//! - [`diff`] - Detailed (path-addressed) change computation
//! - [`transform`] - Schema-guided value transformation
//! - [`resolver`] - Raw identifier to reference resolution
//! - [`diagnostics`] - User-visible diagnostics
//! - [`error`] - Error types

pub mod change;
pub mod diagnostics;
pub mod diff;
pub mod element;
pub mod error;
pub mod ids;
pub mod reference;
pub mod resolver;
pub mod schema;
pub mod template;
pub mod transform;
pub mod value;

/// Prelude module for convenient imports.
///
/// ```
/// use confsync_elements::prelude::*;
/// ```
pub mod prelude {
    pub use crate::change::{Change, ChangeAction, InstanceChange};
    pub use crate::diagnostics::{Diagnostic, Severity};
    pub use crate::diff::{detailed_compare, detailed_compare_instances, DetailedChange};
    pub use crate::element::{
        create_missing_instance, Element, ElementSource, InMemoryElementSource, InstanceElement,
        PARENT_ANNOTATION,
    };
    pub use crate::error::{ElementError, ElementResult};
    pub use crate::ids::{ElemId, IdType, Identified, CONFIG_NAME};
    pub use crate::reference::ReferenceExpression;
    pub use crate::resolver::{LookupTable, LookupTarget, ReferenceResolver, Resolution};
    pub use crate::schema::{FieldDef, ObjectType, PrimitiveType, TypeRef, TypeRegistry};
    pub use crate::template::{
        build_template, extract_template, TemplateExpression, TemplateMapping, TemplatePart,
    };
    pub use crate::transform::{
        transform_element_annotations, transform_instance, transform_values, TransformArgs,
    };
    pub use crate::value::{values_from_json, values_to_json, Value, Values};
}
