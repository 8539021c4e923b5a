//! Reference resolution
//!
//! Turns raw identifiers found in value trees into typed references using
//! caller-supplied lookup tables. A miss is a first-class result: with
//! missing references enabled it becomes a reference to a synthesized
//! placeholder, otherwise the raw identifier is kept as a literal.

use std::collections::HashMap;

use tracing::debug;

use crate::element::{create_missing_instance, InstanceElement};
use crate::reference::ReferenceExpression;
use crate::template::TemplatePart;
use crate::value::Value;

/// What a lookup key maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupTarget {
    /// A model element.
    Element(ReferenceExpression),
    /// A non-element value, e.g. a user email for a user id.
    Literal(Value),
}

/// A named lookup from raw identifier to target.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    name: String,
    entries: HashMap<String, LookupTarget>,
}

impl LookupTable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Index instances by the stringified value of `key_field`.
    ///
    /// Instances without that field are skipped.
    #[must_use]
    pub fn from_instances<'a>(
        name: impl Into<String>,
        instances: impl IntoIterator<Item = &'a InstanceElement>,
        key_field: &str,
    ) -> Self {
        Self::from_instances_by(name, instances, |inst| {
            inst.get(key_field).and_then(Value::to_key_string)
        })
    }

    /// Index instances by a computed key, e.g. a composite of several fields.
    ///
    /// Instances for which `key` yields `None` are skipped; on duplicate keys
    /// the last instance wins.
    #[must_use]
    pub fn from_instances_by<'a, F>(
        name: impl Into<String>,
        instances: impl IntoIterator<Item = &'a InstanceElement>,
        mut key: F,
    ) -> Self
    where
        F: FnMut(&InstanceElement) -> Option<String>,
    {
        let mut table = Self::new(name);
        for inst in instances {
            if let Some(key) = key(inst) {
                table.insert_element(key, inst.to_reference());
            }
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert_element(&mut self, key: impl Into<String>, reference: ReferenceExpression) {
        self.entries.insert(key.into(), LookupTarget::Element(reference));
    }

    pub fn insert_literal(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries
            .insert(key.into(), LookupTarget::Literal(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&LookupTarget> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of resolving one raw identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Matched a model element.
    Reference(ReferenceExpression),
    /// Matched a non-element value.
    Literal(Value),
    /// No match; points at a synthesized placeholder.
    Missing(ReferenceExpression),
    /// No match and placeholders are disabled; the raw identifier.
    Unresolved(String),
}

impl Resolution {
    /// The value to store in place of the raw identifier.
    pub fn into_value(self) -> Value {
        match self {
            Resolution::Reference(r) | Resolution::Missing(r) => Value::Reference(r),
            Resolution::Literal(v) => v,
            Resolution::Unresolved(raw) => Value::String(raw),
        }
    }

    /// The template part standing for the raw identifier.
    pub fn into_template_part(self) -> TemplatePart {
        match self {
            Resolution::Reference(r) | Resolution::Missing(r) => TemplatePart::Reference(r),
            Resolution::Literal(v) => {
                TemplatePart::Literal(v.to_key_string().unwrap_or_default())
            }
            Resolution::Unresolved(raw) => TemplatePart::Literal(raw),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Resolution::Reference(_) | Resolution::Literal(_))
    }
}

/// Resolves raw identifiers through lookup tables in a fixed order.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    adapter: String,
    tables: Vec<LookupTable>,
    enable_missing_references: bool,
}

impl ReferenceResolver {
    #[must_use]
    pub fn new(adapter: impl Into<String>, enable_missing_references: bool) -> Self {
        Self {
            adapter: adapter.into(),
            tables: Vec::new(),
            enable_missing_references,
        }
    }

    /// Append a table; earlier tables take precedence.
    #[must_use]
    pub fn with_table(mut self, table: LookupTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn enable_missing_references(&self) -> bool {
        self.enable_missing_references
    }

    /// Resolve `raw`, synthesizing a placeholder of `target_type` on a miss.
    pub fn resolve(&self, raw: &str, target_type: &str) -> Resolution {
        for table in &self.tables {
            match table.get(raw) {
                Some(LookupTarget::Element(r)) => return Resolution::Reference(r.clone()),
                Some(LookupTarget::Literal(v)) => return Resolution::Literal(v.clone()),
                None => {}
            }
        }
        if self.enable_missing_references {
            debug!(raw = %raw, target_type = %target_type, "Creating missing reference");
            let missing = create_missing_instance(&self.adapter, target_type, raw);
            return Resolution::Missing(missing.to_reference());
        }
        Resolution::Unresolved(raw.to_string())
    }

    /// Resolve a scalar value; non-scalars yield `None`.
    pub fn resolve_value(&self, raw: &Value, target_type: &str) -> Option<Resolution> {
        raw.to_key_string().map(|key| self.resolve(&key, target_type))
    }
}
