//! Type schema
//!
//! Explicit schema descriptions consumed by the value transformer. Object
//! types refer to each other by full name through a [`TypeRegistry`], so
//! mutually recursive types need no ownership cycles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ids::{ElemId, Identified};
use crate::value::{Value, Values};

/// Scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    /// Any value; never checked or recursed with a schema.
    Unknown,
}

/// Declared shape of a field or annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Primitive(PrimitiveType),
    List(Box<TypeRef>),
    Map(Box<TypeRef>),
    /// An object type, by full name.
    Object(String),
}

impl TypeRef {
    pub fn string() -> Self {
        TypeRef::Primitive(PrimitiveType::String)
    }

    pub fn number() -> Self {
        TypeRef::Primitive(PrimitiveType::Number)
    }

    pub fn boolean() -> Self {
        TypeRef::Primitive(PrimitiveType::Boolean)
    }

    pub fn unknown() -> Self {
        TypeRef::Primitive(PrimitiveType::Unknown)
    }

    pub fn list(inner: TypeRef) -> Self {
        TypeRef::List(Box::new(inner))
    }

    pub fn map(inner: TypeRef) -> Self {
        TypeRef::Map(Box::new(inner))
    }

    pub fn object(type_id: &ElemId) -> Self {
        TypeRef::Object(type_id.full_name())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, TypeRef::List(_))
    }

    /// Human-readable name, e.g. `list<string>`.
    pub fn describe(&self) -> String {
        match self {
            TypeRef::Primitive(p) => match p {
                PrimitiveType::String => "string".to_string(),
                PrimitiveType::Number => "number".to_string(),
                PrimitiveType::Boolean => "boolean".to_string(),
                PrimitiveType::Unknown => "unknown".to_string(),
            },
            TypeRef::List(inner) => format!("list<{}>", inner.describe()),
            TypeRef::Map(inner) => format!("map<{}>", inner.describe()),
            TypeRef::Object(name) => name.clone(),
        }
    }
}

/// A field of an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub parent: ElemId,
    pub type_ref: TypeRef,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Values,
}

impl FieldDef {
    pub fn elem_id(&self) -> ElemId {
        ElemId::field_id(self.parent.adapter(), self.parent.type_name(), self.name.as_str())
    }
}

/// A named record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectType {
    pub elem_id: ElemId,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,

    /// Declared shapes of the type's own annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_ref_types: BTreeMap<String, TypeRef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Values,
}

impl ObjectType {
    #[must_use]
    pub fn new(elem_id: ElemId) -> Self {
        Self {
            elem_id,
            fields: BTreeMap::new(),
            annotation_ref_types: BTreeMap::new(),
            annotations: Values::new(),
        }
    }

    /// Add a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        let name = name.into();
        self.fields.insert(
            name.clone(),
            FieldDef {
                name,
                parent: self.elem_id.clone(),
                type_ref,
                annotations: Values::new(),
            },
        );
        self
    }

    /// Declare the shape of an annotation.
    #[must_use]
    pub fn with_annotation_type(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.annotation_ref_types.insert(name.into(), type_ref);
        self
    }

    /// Set an annotation value.
    #[must_use]
    pub fn with_annotation(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

impl Identified for ObjectType {
    fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }
}

/// Arena of object types keyed by full name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, ObjectType>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous type with the same id.
    pub fn register(&mut self, object_type: ObjectType) {
        self.types
            .insert(object_type.elem_id.full_name(), object_type);
    }

    #[must_use]
    pub fn with_type(mut self, object_type: ObjectType) -> Self {
        self.register(object_type);
        self
    }

    pub fn get(&self, full_name: &str) -> Option<&ObjectType> {
        self.types.get(full_name)
    }

    pub fn get_by_id(&self, elem_id: &ElemId) -> Option<&ObjectType> {
        self.get(&elem_id.full_name())
    }

    /// The object type a type reference points at, if it is an object reference.
    pub fn resolve(&self, type_ref: &TypeRef) -> Option<&ObjectType> {
        match type_ref {
            TypeRef::Object(name) => self.get(name),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectType> {
        self.types.values()
    }
}

impl FromIterator<ObjectType> for TypeRegistry {
    fn from_iter<I: IntoIterator<Item = ObjectType>>(iter: I) -> Self {
        let mut registry = TypeRegistry::new();
        for object_type in iter {
            registry.register(object_type);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_types_by_name() {
        let section_id = ElemId::type_id("zendesk", "section");
        let section = ObjectType::new(section_id.clone())
            .with_field("name", TypeRef::string())
            .with_field("sections", TypeRef::list(TypeRef::object(&section_id)));
        let registry = TypeRegistry::new().with_type(section);

        let field = registry.get_by_id(&section_id).unwrap().field("sections").unwrap();
        assert_eq!(field.type_ref.describe(), "list<zendesk.section>");
        let TypeRef::List(inner) = &field.type_ref else {
            panic!("expected list");
        };
        assert_eq!(registry.resolve(inner).unwrap().elem_id, section_id);
        assert_eq!(field.elem_id().full_name(), "zendesk.section.field.sections");
    }

    #[test]
    fn test_registry_from_iter() {
        let registry: TypeRegistry = [
            ObjectType::new(ElemId::type_id("zendesk", "group")),
            ObjectType::new(ElemId::type_id("zendesk", "brand")),
        ]
        .into_iter()
        .collect();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("zendesk.group").is_some());
        assert!(registry.get("zendesk.macro").is_none());
    }
}
