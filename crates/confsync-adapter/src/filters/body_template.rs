//! Links inside text bodies.
//!
//! On fetch, links to the account's own base URL and to other instances
//! (`/articles/<id>`) are replaced by references, turning the body into a
//! template. Before deploy the templates are rendered back to text; after
//! deploy the rendered text is swapped for the original template again.

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error};

use confsync_elements::change::InstanceChange;
use confsync_elements::element::{Element, InstanceElement};
use confsync_elements::reference::ReferenceExpression;
use confsync_elements::template::{
    extract_template, replace_template_with_value, resolve_template, TemplateMapping, TemplatePart,
};
use confsync_elements::value::Value;

use crate::config::BodyTemplateRule;
use crate::error::{AdapterError, AdapterResult};
use crate::filter::{Filter, FilterContext, FilterPhase};
use crate::filters::instances_of;

const BASE_URL_PATTERN: &str = r"(https://[^/]+)";

struct CompiledRule {
    rule: BodyTemplateRule,
    regexes: Vec<Regex>,
}

impl CompiledRule {
    fn compile(rule: &BodyTemplateRule) -> AdapterResult<Self> {
        let invalid =
            |e: regex::Error| AdapterError::configuration(format!("invalid link pattern: {e}"));
        let mut regexes = Vec::new();
        if rule.base_url_type.is_some() {
            regexes.push(Regex::new(BASE_URL_PATTERN).map_err(invalid)?);
        }
        for link in &rule.links {
            let pattern = format!(r"({}\d*)", regex::escape(&link.prefix));
            regexes.push(Regex::new(&pattern).map_err(invalid)?);
        }
        Ok(Self {
            rule: rule.clone(),
            regexes,
        })
    }

    /// Turn one text segment into template parts.
    fn to_parts(&self, elements: &[Element], segment: &str) -> Vec<TemplatePart> {
        if let Some(base_url_type) = &self.rule.base_url_type {
            let field = &self.rule.base_url_field;
            let owner = instances_of(elements, base_url_type)
                .find(|inst| inst.get(field).and_then(Value::as_str) == Some(segment));
            if let Some(owner) = owner {
                let reference = ReferenceExpression::resolved(
                    owner.elem_id.create_nested_id([field.as_str()]),
                    segment,
                );
                return vec![TemplatePart::Reference(reference)];
            }
        }

        for link in &self.rule.links {
            let Some(id) = segment.strip_prefix(link.prefix.as_str()) else {
                continue;
            };
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let target = instances_of(elements, &link.target_type).find(|inst| {
                inst.get("id")
                    .and_then(Value::to_key_string)
                    .is_some_and(|key| key == id)
            });
            if let Some(target) = target {
                return vec![
                    TemplatePart::Literal(link.prefix.clone()),
                    TemplatePart::Reference(target.to_reference()),
                ];
            }
        }
        vec![TemplatePart::Literal(segment.to_string())]
    }
}

pub struct BodyTemplateFilter {
    rules: Vec<BodyTemplateRule>,
    guide_enabled: bool,
    /// Rendered body text mapped to the template it came from, for this cycle.
    deploy_mapping: TemplateMapping,
}

impl BodyTemplateFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            rules: ctx.config.filters.body_templates.clone(),
            guide_enabled: ctx.config.fetch.guide_enabled,
            deploy_mapping: TemplateMapping::new(),
        }
    }

    fn rule_for(&self, instance: &InstanceElement) -> Option<&BodyTemplateRule> {
        self.rules.iter().find(|rule| rule.type_name == instance.type_name())
    }
}

#[async_trait]
impl Filter for BodyTemplateFilter {
    fn name(&self) -> &str {
        "body_template"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::OnFetch, FilterPhase::PreDeploy, FilterPhase::OnDeploy]
    }

    async fn on_fetch(&mut self, elements: &mut Vec<Element>) -> AdapterResult<()> {
        if !self.guide_enabled {
            return Ok(());
        }
        for rule in &self.rules {
            let compiled = CompiledRule::compile(rule)?;
            let all: &[Element] = elements;
            let bodies: Vec<(usize, Value)> = all
                .iter()
                .enumerate()
                .filter_map(|(idx, element)| {
                    let inst = element.as_instance()?;
                    if inst.type_name() != rule.type_name {
                        return None;
                    }
                    let text = inst.get(&rule.field)?.as_str()?;
                    if text.is_empty() {
                        return None;
                    }
                    let body = extract_template(text, &compiled.regexes, |segment| {
                        compiled.to_parts(all, segment)
                    });
                    Some((idx, body))
                })
                .collect();
            debug!(type_name = %rule.type_name, count = bodies.len(), "Extracted body templates");
            for (idx, body) in bodies {
                if let Some(inst) = elements[idx].as_instance_mut() {
                    inst.value.insert(rule.field.clone(), body);
                }
            }
        }
        Ok(())
    }

    async fn pre_deploy(&mut self, changes: &mut Vec<InstanceChange>) -> AdapterResult<()> {
        for change in changes.iter_mut().filter(|c| !c.is_removal()) {
            let Some(field) = self.rule_for(change.data()).map(|rule| rule.field.clone()) else {
                continue;
            };
            let mapping = &mut self.deploy_mapping;
            change.apply_to_data(|inst| {
                if let Some(body) = inst.value.get_mut(&field) {
                    if let Err(e) = replace_template_with_value(body, mapping) {
                        error!(
                            elem_id = %inst.elem_id,
                            error = %e,
                            "Failed to render body template"
                        );
                    }
                }
            });
        }
        Ok(())
    }

    async fn on_deploy(&mut self, changes: &mut Vec<InstanceChange>) -> AdapterResult<()> {
        for change in changes.iter_mut().filter(|c| !c.is_removal()) {
            let Some(field) = self.rule_for(change.data()).map(|rule| rule.field.clone()) else {
                continue;
            };
            let mapping = &self.deploy_mapping;
            change.apply_to_data(|inst| {
                if let Some(body) = inst.value.get_mut(&field) {
                    resolve_template(body, mapping);
                }
            });
        }
        Ok(())
    }
}
