//! Elements and element sources

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::ids::{ElemId, Identified};
use crate::reference::{ReferenceExpression, MISSING_PREFIX};
use crate::schema::ObjectType;
use crate::value::{Value, Values};

/// Annotation holding the parent references of a child instance.
pub const PARENT_ANNOTATION: &str = "_parent";

/// A value of some object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceElement {
    pub elem_id: ElemId,

    /// Id of the instance's object type.
    pub ref_type: ElemId,

    #[serde(default)]
    pub value: Values,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Values,
}

impl InstanceElement {
    /// Create an instance named `name` of the type `ref_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, ref_type: &ElemId, value: Values) -> Self {
        Self {
            elem_id: ElemId::instance_id(ref_type.adapter(), ref_type.type_name(), name),
            ref_type: ref_type.clone(),
            value,
            annotations: Values::new(),
        }
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    /// Append a parent reference to the `_parent` annotation.
    #[must_use]
    pub fn with_parent(mut self, parent: ReferenceExpression) -> Self {
        let entry = self
            .annotations
            .entry(PARENT_ANNOTATION.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        match entry {
            Value::List(items) => items.push(Value::Reference(parent)),
            other => *other = Value::List(vec![Value::Reference(parent)]),
        }
        self
    }

    /// References listed in the `_parent` annotation.
    pub fn parents(&self) -> Vec<&ReferenceExpression> {
        match self.annotations.get(PARENT_ANNOTATION) {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_reference).collect(),
            Some(Value::Reference(r)) => vec![r],
            _ => Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        self.ref_type.type_name()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    /// A reference to this instance with its value cached.
    pub fn to_reference(&self) -> ReferenceExpression {
        ReferenceExpression::resolved(self.elem_id.clone(), Value::Map(self.value.clone()))
    }
}

impl Identified for InstanceElement {
    fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }
}

/// A typed, identified unit of configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Object(ObjectType),
    Instance(InstanceElement),
}

impl Element {
    pub fn as_instance(&self) -> Option<&InstanceElement> {
        match self {
            Element::Instance(inst) => Some(inst),
            Element::Object(_) => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut InstanceElement> {
        match self {
            Element::Instance(inst) => Some(inst),
            Element::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Element::Object(obj) => Some(obj),
            Element::Instance(_) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectType> {
        match self {
            Element::Object(obj) => Some(obj),
            Element::Instance(_) => None,
        }
    }

    pub fn into_instance(self) -> Option<InstanceElement> {
        match self {
            Element::Instance(inst) => Some(inst),
            Element::Object(_) => None,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, Element::Instance(_))
    }
}

impl Identified for Element {
    fn elem_id(&self) -> &ElemId {
        match self {
            Element::Object(obj) => &obj.elem_id,
            Element::Instance(inst) => &inst.elem_id,
        }
    }
}

impl From<InstanceElement> for Element {
    fn from(inst: InstanceElement) -> Self {
        Element::Instance(inst)
    }
}

impl From<ObjectType> for Element {
    fn from(obj: ObjectType) -> Self {
        Element::Object(obj)
    }
}

/// Make a raw identifier usable as an instance name.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Synthesize a placeholder instance for an identifier that matched nothing.
///
/// The instance is named `missing_<raw>` under the attempted type and keeps
/// the raw identifier as its `id`.
pub fn create_missing_instance(adapter: &str, type_name: &str, raw: &str) -> InstanceElement {
    let mut value = Values::new();
    value.insert("id".to_string(), Value::from(raw));
    InstanceElement::new(
        format!("{MISSING_PREFIX}{}", sanitize_name(raw)),
        &ElemId::type_id(adapter, type_name),
        value,
    )
}

/// Read access to a previously stored element snapshot.
#[async_trait]
pub trait ElementSource: Send + Sync {
    /// Get an element by id.
    async fn get(&self, elem_id: &ElemId) -> Option<Element>;

    /// List all element ids.
    async fn list(&self) -> Vec<ElemId>;

    /// Get every stored element.
    async fn get_all(&self) -> Vec<Element> {
        let mut elements = Vec::new();
        for id in self.list().await {
            if let Some(element) = self.get(&id).await {
                elements.push(element);
            }
        }
        elements
    }
}

/// Element arena keyed by full name.
#[derive(Debug, Default)]
pub struct InMemoryElementSource {
    elements: RwLock<BTreeMap<String, Element>>,
}

impl InMemoryElementSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let map = elements
            .into_iter()
            .map(|e| (e.elem_id().full_name(), e))
            .collect();
        Self {
            elements: RwLock::new(map),
        }
    }

    /// Insert or replace an element.
    pub async fn set(&self, element: Element) {
        self.elements
            .write()
            .await
            .insert(element.elem_id().full_name(), element);
    }

    pub async fn remove(&self, elem_id: &ElemId) -> Option<Element> {
        self.elements.write().await.remove(&elem_id.full_name())
    }
}

#[async_trait]
impl ElementSource for InMemoryElementSource {
    async fn get(&self, elem_id: &ElemId) -> Option<Element> {
        self.elements.read().await.get(&elem_id.full_name()).cloned()
    }

    async fn list(&self) -> Vec<ElemId> {
        self.elements
            .read()
            .await
            .values()
            .map(|e| e.elem_id().clone())
            .collect()
    }

    async fn get_all(&self) -> Vec<Element> {
        self.elements.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::values_from_json;
    use serde_json::json;

    fn section_type() -> ElemId {
        ElemId::type_id("zendesk", "section")
    }

    #[test]
    fn test_parents() {
        let category = InstanceElement::new(
            "general",
            &ElemId::type_id("zendesk", "category"),
            values_from_json(json!({"id": 1})),
        );
        let section =
            InstanceElement::new("s1", &section_type(), values_from_json(json!({"id": 2})))
                .with_parent(category.to_reference());
        let parents = section.parents();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].elem_id, category.elem_id);
        assert_eq!(section.elem_id.full_name(), "zendesk.section.instance.s1");
    }

    #[test]
    fn test_missing_instance() {
        let missing = create_missing_instance("zendesk", "group", "123 45");
        assert_eq!(missing.elem_id.full_name(), "zendesk.group.instance.missing_123_45");
        assert_eq!(missing.get("id"), Some(&Value::from("123 45")));
        assert!(missing.to_reference().is_missing());
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let inst = InstanceElement::new("s1", &section_type(), Values::new());
        let source = InMemoryElementSource::from_elements([Element::from(inst.clone())]);
        assert_eq!(source.get(&inst.elem_id).await, Some(Element::Instance(inst.clone())));
        assert!(source
            .get(&ElemId::instance_id("zendesk", "section", "s2"))
            .await
            .is_none());

        source.set(ObjectType::new(section_type()).into()).await;
        assert_eq!(source.list().await.len(), 2);
        assert_eq!(source.get_all().await.len(), 2);
        assert!(source.remove(&inst.elem_id).await.is_some());
        assert_eq!(source.list().await.len(), 1);
    }
}
