//! Cross-element references

use serde::{Deserialize, Serialize};

use crate::ids::{ElemId, Identified};
use crate::value::Value;

/// Name prefix of synthesized placeholder instances.
pub const MISSING_PREFIX: &str = "missing_";

/// A typed pointer to another element (or to a value nested inside one).
///
/// The target is addressed by id only; `value` optionally caches the
/// resolved target so templates can be rendered without the full model.
/// Two references are equal when they point at the same id, regardless of
/// what either has cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceExpression {
    pub elem_id: ElemId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<Value>>,
}

impl ReferenceExpression {
    /// Create an unresolved reference.
    #[must_use]
    pub fn new(elem_id: ElemId) -> Self {
        Self {
            elem_id,
            value: None,
        }
    }

    /// Create a reference with a cached target value.
    #[must_use]
    pub fn resolved(elem_id: ElemId, value: impl Into<Value>) -> Self {
        Self {
            elem_id,
            value: Some(Box::new(value.into())),
        }
    }

    /// Set the cached target value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(Box::new(value.into()));
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the reference points at a synthesized placeholder.
    pub fn is_missing(&self) -> bool {
        let (top, _) = self.elem_id.create_top_level_parent_id();
        top.name().starts_with(MISSING_PREFIX)
    }

    pub fn resolved_value(&self) -> Option<&Value> {
        self.value.as_deref()
    }

    /// The `id` field of a resolved top-level target, if any.
    pub fn target_id(&self) -> Option<&Value> {
        if !self.elem_id.is_top_level() {
            return None;
        }
        self.resolved_value().and_then(|v| v.get("id"))
    }
}

impl PartialEq for ReferenceExpression {
    fn eq(&self, other: &Self) -> bool {
        self.elem_id == other.elem_id
    }
}

impl Identified for ReferenceExpression {
    fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_ignores_cached_value() {
        let id = ElemId::instance_id("zendesk", "group", "support");
        let a = ReferenceExpression::new(id.clone());
        let b = ReferenceExpression::resolved(id, Value::from(json!({"id": 12})));
        assert_eq!(a, b);
        assert!(!a.is_resolved());
        assert!(b.is_resolved());
    }

    #[test]
    fn test_missing_detection() {
        let missing =
            ReferenceExpression::new(ElemId::instance_id("zendesk", "group", "missing_123"));
        assert!(missing.is_missing());
        let nested = ReferenceExpression::new(
            ElemId::instance_id("zendesk", "brand", "missing_x").create_nested_id(["brand_url"]),
        );
        assert!(nested.is_missing());
        let real = ReferenceExpression::new(ElemId::instance_id("zendesk", "group", "support"));
        assert!(!real.is_missing());
    }

    #[test]
    fn test_target_id() {
        let id = ElemId::instance_id("zendesk", "group", "support");
        let r = ReferenceExpression::resolved(
            id.clone(),
            Value::from(json!({"id": 12, "name": "Support"})),
        );
        assert_eq!(r.target_id(), Some(&Value::from(12)));
        let nested = ReferenceExpression::resolved(id.create_nested_id(["name"]), "Support");
        assert_eq!(nested.target_id(), None);
    }
}
