//! Schema-guided value transformation
//!
//! Walks a value tree against its object type, handing every node to a
//! transform function before recursing into it. The schema decides whether a
//! node is recursed as a list, a map, a nested object or left opaque.
//!
//! Shape mismatches are coerced in non-strict mode (a scalar at a list field
//! becomes a one-element list) and reported as
//! [`ElementError::SchemaMismatch`] in strict mode. Keys without a field
//! definition are passed to the transform with no field and recursed without
//! a schema in both modes.

use crate::error::{ElementError, ElementResult};
use crate::element::InstanceElement;
use crate::ids::ElemId;
use crate::schema::{FieldDef, ObjectType, PrimitiveType, TypeRef, TypeRegistry};
use crate::value::{Value, Values};

/// Input handed to a transform function.
#[derive(Debug)]
pub struct TransformArgs<'a> {
    /// The node, owned; return it (possibly replaced) to keep it.
    pub value: Value,
    /// The field the node belongs to, if the schema knows it.
    pub field: Option<&'a FieldDef>,
    /// Id of the node.
    pub path: &'a ElemId,
}

/// A transform function: `None` drops the node.
pub type TransformFn<'f> = dyn FnMut(TransformArgs<'_>) -> Option<Value> + 'f;

/// Where the keys of a map get their declared types from.
#[derive(Clone, Copy)]
enum Keys<'a> {
    Fields(&'a ObjectType),
    Annotations(&'a ObjectType),
    Uniform(Option<&'a TypeRef>, Option<&'a FieldDef>),
}

impl<'a> Keys<'a> {
    fn lookup(&self, key: &str) -> (Option<&'a TypeRef>, Option<&'a FieldDef>) {
        match *self {
            Keys::Fields(obj) => match obj.field(key) {
                Some(field) => (Some(&field.type_ref), Some(field)),
                None => (None, None),
            },
            Keys::Annotations(obj) => (obj.annotation_ref_types.get(key), None),
            Keys::Uniform(type_ref, field) => (type_ref, field),
        }
    }
}

struct Walker<'r, 't, 'f> {
    registry: &'r TypeRegistry,
    strict: bool,
    transform: &'t mut TransformFn<'f>,
}

impl<'r, 't, 'f> Walker<'r, 't, 'f> {
    fn walk_map(
        &mut self,
        values: &Values,
        keys: Keys<'r>,
        path: &ElemId,
    ) -> ElementResult<Option<Values>> {
        let mut out = Values::new();
        for (key, value) in values {
            let (type_ref, field) = keys.lookup(key);
            let nested = path.create_nested_id([key.as_str()]);
            if let Some(v) = self.walk(value.clone(), type_ref, field, &nested)? {
                out.insert(key.clone(), v);
            }
        }
        if out.is_empty() && !values.is_empty() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    fn walk_list(
        &mut self,
        items: Vec<Value>,
        inner: Option<&'r TypeRef>,
        field: Option<&'r FieldDef>,
        path: &ElemId,
    ) -> ElementResult<Value> {
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let nested = path.create_nested_id([idx.to_string()]);
            if let Some(v) = self.walk(item, inner, field, &nested)? {
                out.push(v);
            }
        }
        Ok(Value::List(out))
    }

    fn mismatch(&self, path: &ElemId, expected: &str, value: Value) -> ElementResult<Value> {
        if self.strict {
            return Err(ElementError::schema_mismatch(path, expected, value.type_name()));
        }
        Ok(value)
    }

    /// Walk a node whose schema is unknown or opaque.
    fn walk_untyped(&mut self, value: Value, path: &ElemId) -> ElementResult<Option<Value>> {
        Ok(Some(match value {
            Value::Map(map) => match self.walk_map(&map, Keys::Uniform(None, None), path)? {
                Some(m) => Value::Map(m),
                None => return Ok(None),
            },
            Value::List(items) => self.walk_list(items, None, None, path)?,
            other => other,
        }))
    }

    fn walk(
        &mut self,
        value: Value,
        type_ref: Option<&'r TypeRef>,
        field: Option<&'r FieldDef>,
        path: &ElemId,
    ) -> ElementResult<Option<Value>> {
        let Some(value) = (self.transform)(TransformArgs { value, field, path }) else {
            return Ok(None);
        };
        if matches!(value, Value::Reference(_) | Value::Template(_)) {
            return Ok(Some(value));
        }

        match type_ref {
            None | Some(TypeRef::Primitive(PrimitiveType::Unknown)) => {
                self.walk_untyped(value, path)
            }
            Some(TypeRef::List(inner)) => match value {
                Value::List(items) => {
                    Ok(Some(self.walk_list(items, Some(inner.as_ref()), field, path)?))
                }
                Value::Null => Ok(Some(Value::Null)),
                scalar => {
                    if self.strict {
                        return Err(ElementError::schema_mismatch(path, "list", scalar.type_name()));
                    }
                    Ok(Some(self.walk_list(vec![scalar], Some(inner.as_ref()), field, path)?))
                }
            },
            Some(TypeRef::Map(inner)) => match value {
                Value::Map(map) => {
                    let keys = Keys::Uniform(Some(inner.as_ref()), field);
                    Ok(self.walk_map(&map, keys, path)?.map(Value::Map))
                }
                Value::Null => Ok(Some(Value::Null)),
                other => self.mismatch(path, "map", other).map(Some),
            },
            Some(TypeRef::Object(name)) => match value {
                Value::Map(map) => {
                    let registry = self.registry;
                    match registry.get(name) {
                        Some(obj) => {
                            Ok(self.walk_map(&map, Keys::Fields(obj), path)?.map(Value::Map))
                        }
                        None => self.walk_untyped(Value::Map(map), path),
                    }
                }
                Value::Null => Ok(Some(Value::Null)),
                other => self.mismatch(path, name, other).map(Some),
            },
            Some(primitive @ TypeRef::Primitive(_)) => match value {
                Value::Map(_) | Value::List(_) => {
                    let value = self.mismatch(path, &primitive.describe(), value)?;
                    self.walk_untyped(value, path)
                }
                scalar => Ok(Some(scalar)),
            },
        }
    }
}

/// Transform a value map against an object type.
///
/// Returns `None` only when the transform dropped every entry of a non-empty
/// map; callers replacing a stored value default to an empty map.
pub fn transform_values(
    values: &Values,
    object_type: &ObjectType,
    registry: &TypeRegistry,
    path: &ElemId,
    strict: bool,
    transform: &mut TransformFn<'_>,
) -> ElementResult<Option<Values>> {
    let mut walker = Walker {
        registry,
        strict,
        transform,
    };
    walker.walk_map(values, Keys::Fields(object_type), path)
}

/// Transform the annotations of an object type using its annotation types.
pub fn transform_element_annotations(
    object_type: &ObjectType,
    registry: &TypeRegistry,
    strict: bool,
    transform: &mut TransformFn<'_>,
) -> ElementResult<Option<Values>> {
    let mut walker = Walker {
        registry,
        strict,
        transform,
    };
    walker.walk_map(
        &object_type.annotations,
        Keys::Annotations(object_type),
        &object_type.elem_id,
    )
}

/// Transform an instance's value against its registered type.
pub fn transform_instance(
    instance: &InstanceElement,
    registry: &TypeRegistry,
    strict: bool,
    transform: &mut TransformFn<'_>,
) -> ElementResult<Values> {
    let object_type = registry
        .get_by_id(&instance.ref_type)
        .ok_or_else(|| ElementError::UnknownType {
            type_name: instance.ref_type.full_name(),
        })?;
    let values = transform_values(
        &instance.value,
        object_type,
        registry,
        &instance.elem_id,
        strict,
        transform,
    )?;
    Ok(values.unwrap_or_default())
}
