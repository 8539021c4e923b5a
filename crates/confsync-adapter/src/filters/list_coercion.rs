//! List coercion on fetch.
//!
//! APIs return a bare scalar where a one-element list is meant, and return
//! some lists in no meaningful order. Every instance value and every object
//! type's annotations are walked non-strictly against their schema, so scalars
//! at list fields become single-element lists; configured unordered lists are
//! then sorted for stable diffs.

use async_trait::async_trait;
use std::cmp::Ordering;
use tracing::{debug, warn};

use confsync_elements::element::Element;
use confsync_elements::schema::TypeRegistry;
use confsync_elements::transform::{
    transform_element_annotations, transform_instance, TransformArgs,
};
use confsync_elements::value::Value;

use crate::config::UnorderedListRule;
use crate::error::AdapterResult;
use crate::filter::{Filter, FilterContext, FilterPhase};

fn keep(args: TransformArgs<'_>) -> Option<Value> {
    Some(args.value)
}

fn sort_key(value: &Value, sort_by: Option<&str>) -> Option<String> {
    match sort_by {
        Some(key) => value.get(key).and_then(Value::to_key_string),
        None => value.to_key_string(),
    }
}

pub struct ListCoercionFilter {
    unordered_lists: Vec<UnorderedListRule>,
}

impl ListCoercionFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            unordered_lists: ctx.config.filters.unordered_lists.clone(),
        }
    }

    fn sort_unordered(&self, elements: &mut [Element]) {
        for rule in &self.unordered_lists {
            for inst in elements
                .iter_mut()
                .filter_map(Element::as_instance_mut)
                .filter(|inst| inst.type_name() == rule.type_name)
            {
                if let Some(items) = inst.value.get_mut(&rule.field).and_then(Value::as_list_mut) {
                    let sort_by = rule.sort_by.as_deref();
                    items.sort_by(|a, b| match (sort_key(a, sort_by), sort_key(b, sort_by)) {
                        (Some(x), Some(y)) => x.cmp(&y),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Filter for ListCoercionFilter {
    fn name(&self) -> &str {
        "list_coercion"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::OnFetch]
    }

    async fn on_fetch(&mut self, elements: &mut Vec<Element>) -> AdapterResult<()> {
        let registry: TypeRegistry = elements
            .iter()
            .filter_map(Element::as_object)
            .cloned()
            .collect();

        let mut coerced_annotations = Vec::new();
        for obj in registry.iter() {
            let annotations = transform_element_annotations(obj, &registry, false, &mut keep)?;
            coerced_annotations.push((obj.elem_id.clone(), annotations.unwrap_or_default()));
        }

        for element in elements.iter_mut() {
            match element {
                Element::Instance(inst) => {
                    match transform_instance(inst, &registry, false, &mut keep) {
                        Ok(value) => inst.value = value,
                        Err(e) => {
                            warn!(elem_id = %inst.elem_id, error = %e, "Skipping list coercion");
                        }
                    }
                }
                Element::Object(obj) => {
                    if let Some((_, annotations)) =
                        coerced_annotations.iter_mut().find(|(id, _)| *id == obj.elem_id)
                    {
                        obj.annotations = std::mem::take(annotations);
                    }
                }
            }
        }

        self.sort_unordered(elements);
        debug!(types = registry.len(), "Coerced lists");
        Ok(())
    }
}
