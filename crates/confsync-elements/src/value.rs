//! Value trees
//!
//! JSON-like nested data carried by instances and annotations, extended with
//! reference and template leaves.

use serde::de::Error as _;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::{ElementError, ElementResult};
use crate::ids::ElemId;
use crate::reference::ReferenceExpression;
use crate::template::{TemplateExpression, TemplatePart};

/// A keyed mapping of values with deterministic key order.
pub type Values = BTreeMap<String, Value>;

/// A node in a value tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(Values),
    Reference(ReferenceExpression),
    Template(TemplateExpression),
}

impl Value {
    /// Shape name used in schema mismatch messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Reference(_) => "reference",
            Value::Template(_) => "template",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Values> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Values> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceExpression> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&TemplateExpression> {
        match self {
            Value::Template(t) => Some(t),
            _ => None,
        }
    }

    /// Look up a key of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Follow a path of map keys and list indices.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter().try_fold(self, |current, part| match current {
            Value::Map(map) => map.get(part.as_ref()),
            Value::List(items) => part
                .as_ref()
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx)),
            _ => None,
        })
    }

    /// Mutable variant of [`Value::get_path`].
    pub fn get_path_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut Value> {
        let mut current = self;
        for part in path {
            current = match current {
                Value::Map(map) => map.get_mut(part.as_ref())?,
                Value::List(items) => {
                    let idx = part.as_ref().parse::<usize>().ok()?;
                    items.get_mut(idx)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Render a scalar as a lookup key; ids may arrive as numbers or strings.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert to plain JSON, flattening references to the raw values they stand for.
    pub fn to_json(&self) -> ElementResult<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<ElementResult<Vec<_>>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(values_to_json(map)?),
            Value::Reference(reference) => {
                if let Some(id) = reference.target_id() {
                    return id.to_json();
                }
                match reference.resolved_value() {
                    Some(value) if !reference.elem_id.is_top_level() => value.to_json()?,
                    Some(_) => {
                        return Err(ElementError::invalid_template_value(
                            &reference.elem_id,
                            "target has no id",
                        ))
                    }
                    None => return Err(ElementError::unresolved(&reference.elem_id)),
                }
            }
            Value::Template(template) => serde_json::Value::String(template.render()?),
        })
    }
}

/// Convert a value map to a JSON object.
pub fn values_to_json(
    values: &Values,
) -> ElementResult<serde_json::Map<String, serde_json::Value>> {
    values
        .iter()
        .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
        .collect()
}

/// Build a value map from JSON. Non-object input yields an empty map.
pub fn values_from_json(json: serde_json::Value) -> Values {
    match Value::from(json) {
        Value::Map(map) => map,
        _ => Values::new(),
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Values> for Value {
    fn from(map: Values) -> Self {
        Value::Map(map)
    }
}

impl From<ReferenceExpression> for Value {
    fn from(r: ReferenceExpression) -> Self {
        Value::Reference(r)
    }
}

impl From<TemplateExpression> for Value {
    fn from(t: TemplateExpression) -> Self {
        Value::Template(t)
    }
}

const REF_MARKER: &str = "_ref";
const TEMPLATE_MARKER: &str = "_template";

// References serialize as `{"_ref": "<full name>"}` and templates as
// `{"_template": [...]}` so dumps stay readable. Cached targets are not written.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => map.serialize(serializer),
            Value::Reference(r) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(REF_MARKER, &r.elem_id)?;
                map.end()
            }
            Value::Template(t) => {
                let parts: Vec<serde_json::Value> = t
                    .parts()
                    .iter()
                    .map(|part| match part {
                        TemplatePart::Literal(s) => serde_json::Value::String(s.clone()),
                        TemplatePart::Reference(r) => {
                            serde_json::json!({ "_ref": r.elem_id.full_name() })
                        }
                    })
                    .collect();
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(TEMPLATE_MARKER, &parts)?;
                map.end()
            }
        }
    }
}

/// The single marker entry of a `{"_ref": ..}` or `{"_template": ..}` object.
fn marker<'a>(
    map: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<&'a serde_json::Value> {
    if map.len() == 1 {
        map.get(key)
    } else {
        None
    }
}

fn reference_from_marker(full_name: &serde_json::Value) -> ElementResult<ReferenceExpression> {
    let full_name = full_name.as_str().ok_or_else(|| ElementError::InvalidElemId {
        id: full_name.to_string(),
    })?;
    Ok(ReferenceExpression::new(ElemId::parse(full_name)?))
}

/// Inverse of the `Serialize` impl: rebuild reference and template leaves.
fn from_marked_json(json: serde_json::Value) -> ElementResult<Value> {
    Ok(match json {
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_marked_json)
                .collect::<ElementResult<_>>()?,
        ),
        serde_json::Value::Object(map) => {
            if let Some(full_name) = marker(&map, REF_MARKER) {
                return Ok(Value::Reference(reference_from_marker(full_name)?));
            }
            if let Some(serde_json::Value::Array(parts)) = marker(&map, TEMPLATE_MARKER) {
                let parts = parts
                    .iter()
                    .map(|part| match part {
                        serde_json::Value::String(s) => Ok(TemplatePart::Literal(s.clone())),
                        serde_json::Value::Object(part) => marker(part, REF_MARKER)
                            .ok_or_else(|| ElementError::InvalidElemId {
                                id: serde_json::Value::Object(part.clone()).to_string(),
                            })
                            .and_then(reference_from_marker)
                            .map(TemplatePart::Reference),
                        other => Err(ElementError::InvalidElemId {
                            id: other.to_string(),
                        }),
                    })
                    .collect::<ElementResult<Vec<_>>>()?;
                return Ok(Value::Template(TemplateExpression::new(parts)));
            }
            Value::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, from_marked_json(v)?)))
                    .collect::<ElementResult<_>>()?,
            )
        }
        scalar => Value::from(scalar),
    })
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        from_marked_json(json).map_err(D::Error::custom)
    }
}
