//! Template expressions
//!
//! Strings built from literal fragments interleaved with references. A
//! template is rendered back to its raw string once every reference part has
//! a cached target value.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ElementError, ElementResult};
use crate::reference::ReferenceExpression;
use crate::value::Value;

/// One part of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplatePart {
    Literal(String),
    Reference(ReferenceExpression),
}

impl From<&str> for TemplatePart {
    fn from(s: &str) -> Self {
        TemplatePart::Literal(s.to_string())
    }
}

impl From<String> for TemplatePart {
    fn from(s: String) -> Self {
        TemplatePart::Literal(s)
    }
}

impl From<ReferenceExpression> for TemplatePart {
    fn from(r: ReferenceExpression) -> Self {
        TemplatePart::Reference(r)
    }
}

/// An immutable sequence of template parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExpression {
    parts: Vec<TemplatePart>,
}

impl TemplateExpression {
    /// Build a template, merging adjacent literals and dropping empty ones.
    #[must_use]
    pub fn new(parts: impl IntoIterator<Item = TemplatePart>) -> Self {
        let mut merged: Vec<TemplatePart> = Vec::new();
        for part in parts {
            match part {
                TemplatePart::Literal(s) if s.is_empty() => {}
                TemplatePart::Literal(s) => match merged.last_mut() {
                    Some(TemplatePart::Literal(prev)) => prev.push_str(&s),
                    _ => merged.push(TemplatePart::Literal(s)),
                },
                reference => merged.push(reference),
            }
        }
        Self { parts: merged }
    }

    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    pub fn references(&self) -> impl Iterator<Item = &ReferenceExpression> {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::Reference(r) => Some(r),
            TemplatePart::Literal(_) => None,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.references().all(ReferenceExpression::is_resolved)
    }

    /// Render to a flat string using [`render_reference`] for reference parts.
    pub fn render(&self) -> ElementResult<String> {
        self.render_with(render_reference)
    }

    /// Render to a flat string with a custom reference renderer.
    pub fn render_with<F>(&self, mut prep: F) -> ElementResult<String>
    where
        F: FnMut(&ReferenceExpression) -> ElementResult<String>,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(s),
                TemplatePart::Reference(r) => out.push_str(&prep(r)?),
            }
        }
        Ok(out)
    }
}

/// Default rendering of a reference part.
///
/// A top-level target renders as its `id`; a nested target must be a string.
pub fn render_reference(reference: &ReferenceExpression) -> ElementResult<String> {
    let value = reference
        .resolved_value()
        .ok_or_else(|| ElementError::unresolved(&reference.elem_id))?;
    if reference.elem_id.is_top_level() {
        return value
            .get("id")
            .and_then(Value::to_key_string)
            .ok_or_else(|| {
                ElementError::invalid_template_value(&reference.elem_id, "target has no id")
            });
    }
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(ElementError::invalid_template_value(
            &reference.elem_id,
            format!("expected string, found {}", other.type_name()),
        )),
    }
}

/// Build a template value; parts without any reference collapse to a plain string.
pub fn build_template(parts: impl IntoIterator<Item = TemplatePart>) -> Value {
    let template = TemplateExpression::new(parts);
    if template.references().next().is_some() {
        return Value::Template(template);
    }
    let joined: String = template
        .parts()
        .iter()
        .filter_map(|part| match part {
            TemplatePart::Literal(s) => Some(s.as_str()),
            TemplatePart::Reference(_) => None,
        })
        .collect();
    Value::String(joined)
}

/// Split `text` around every match of `regex`, keeping the matches.
fn split_keeping_matches(text: &str, regex: &Regex) -> Vec<String> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in regex.find_iter(text) {
        if m.start() > last {
            out.push(text[last..m.start()].to_string());
        }
        if !m.as_str().is_empty() {
            out.push(m.as_str().to_string());
        }
        last = m.end();
    }
    if last < text.len() {
        out.push(text[last..].to_string());
    }
    out
}

/// Extract a template from free text.
///
/// The text is split successively by each regex (matches are kept as their own
/// segments), then every segment is handed to `to_parts`, which may turn it
/// into references. Text that yields no reference stays a plain string.
pub fn extract_template<F>(text: &str, regexes: &[Regex], mut to_parts: F) -> Value
where
    F: FnMut(&str) -> Vec<TemplatePart>,
{
    let segments = regexes.iter().fold(vec![text.to_string()], |segments, regex| {
        segments
            .iter()
            .flat_map(|segment| split_keeping_matches(segment, regex))
            .collect()
    });
    build_template(segments.iter().flat_map(|segment| to_parts(segment)))
}

/// Rendered strings mapped back to the templates they came from.
pub type TemplateMapping = HashMap<String, TemplateExpression>;

/// Render a template value in place, remembering the original in `mapping`.
pub fn replace_template_with_value(
    value: &mut Value,
    mapping: &mut TemplateMapping,
) -> ElementResult<()> {
    if let Value::Template(template) = value {
        let rendered = template.render()?;
        mapping.insert(rendered.clone(), template.clone());
        *value = Value::String(rendered);
    }
    Ok(())
}

/// Restore a template previously rendered by [`replace_template_with_value`].
pub fn resolve_template(value: &mut Value, mapping: &TemplateMapping) {
    if let Value::String(s) = value {
        if let Some(template) = mapping.get(s) {
            *value = Value::Template(template.clone());
        }
    }
}
