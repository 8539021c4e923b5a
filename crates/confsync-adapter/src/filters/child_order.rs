//! Ordered child lists.
//!
//! On fetch every parent gets a list of references to its children, sorted
//! the way the remote UI shows them. On deploy a changed list is turned into
//! per-child position updates.

use async_trait::async_trait;

use confsync_elements::change::InstanceChange;
use confsync_elements::element::{Element, InstanceElement};
use confsync_elements::value::Value;

use crate::config::ChildOrderRule;
use crate::deployment::ApiChangeDeployer;
use crate::error::AdapterResult;
use crate::filter::{DeployResult, Filter, FilterContext, FilterDeployOutput, FilterPhase};
use crate::filters::instances_of;
use crate::ordering::{deploy_order_changes, order_children_by_position};

pub struct ChildOrderFilter {
    rules: Vec<ChildOrderRule>,
    guide_enabled: bool,
    deployer: ApiChangeDeployer,
    max_concurrency: usize,
}

impl ChildOrderFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            rules: ctx.config.filters.child_order.clone(),
            guide_enabled: ctx.config.fetch.guide_enabled,
            deployer: ApiChangeDeployer::from_context(ctx),
            max_concurrency: ctx.config.client.max_concurrent_requests,
        }
    }

    fn ordered_children(
        elements: &[Element],
        rule: &ChildOrderRule,
        parent: &InstanceElement,
    ) -> Option<Value> {
        let parent_id = parent.get("id")?.to_key_string()?;
        let mut children: Vec<&InstanceElement> = instances_of(elements, &rule.child_type)
            .filter(|child| {
                child
                    .get(&rule.parent_id_field)
                    .and_then(Value::to_key_string)
                    .is_some_and(|id| id == parent_id)
            })
            .collect();
        order_children_by_position(&mut children, &rule.position_field, &rule.created_at_field);
        Some(Value::List(
            children
                .into_iter()
                .map(|child| Value::Reference(child.to_reference()))
                .collect(),
        ))
    }
}

#[async_trait]
impl Filter for ChildOrderFilter {
    fn name(&self) -> &str {
        "child_order"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::OnFetch, FilterPhase::Deploy]
    }

    async fn on_fetch(&mut self, elements: &mut Vec<Element>) -> AdapterResult<()> {
        if !self.guide_enabled {
            return Ok(());
        }
        for rule in &self.rules {
            let all: &[Element] = elements;
            let lists: Vec<(usize, Value)> = all
                .iter()
                .enumerate()
                .filter_map(|(idx, element)| {
                    let parent = element.as_instance()?;
                    if parent.type_name() != rule.parent_type {
                        return None;
                    }
                    Self::ordered_children(all, rule, parent).map(|list| (idx, list))
                })
                .collect();
            for (idx, list) in lists {
                if let Some(parent) = elements[idx].as_instance_mut() {
                    parent.value.insert(rule.order_field.clone(), list);
                }
            }
        }
        Ok(())
    }

    async fn deploy(&mut self, changes: Vec<InstanceChange>) -> AdapterResult<FilterDeployOutput> {
        let mut deploy_result = DeployResult::new();
        let mut leftover_changes = changes;
        for rule in &self.rules {
            let output = deploy_order_changes(
                std::mem::take(&mut leftover_changes),
                rule,
                &self.deployer,
                self.max_concurrency,
            )
            .await;
            deploy_result.extend(output.deploy_result);
            leftover_changes = output.leftover_changes;
        }
        Ok(FilterDeployOutput {
            deploy_result,
            leftover_changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiClient, ApiResponse, HttpError, HttpMethod};
    use crate::config::{AdapterConfig, TypeApiDefinition};
    use confsync_elements::change::Change;
    use confsync_elements::element::InMemoryElementSource;
    use confsync_elements::ids::ElemId;
    use confsync_elements::value::values_from_json;
    use serde_json::{json, Value as JsonValue};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<(HttpMethod, String, Option<JsonValue>)>>,
    }

    #[async_trait]
    impl ApiClient for RecordingClient {
        async fn request(
            &self,
            method: HttpMethod,
            url: &str,
            body: Option<JsonValue>,
        ) -> Result<ApiResponse, HttpError> {
            self.calls.lock().unwrap().push((method, url.to_string(), body));
            Ok(ApiResponse::ok(json!({})))
        }
    }

    fn rule() -> ChildOrderRule {
        ChildOrderRule {
            parent_type: "category".into(),
            child_type: "section".into(),
            order_field: "sections".into(),
            parent_id_field: "category_id".into(),
            position_field: "position".into(),
            created_at_field: "created_at".into(),
        }
    }

    fn context(client: Arc<RecordingClient>) -> FilterContext {
        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        config.filters.child_order.push(rule());
        config.api_definitions = config.api_definitions.with_type(
            "section",
            TypeApiDefinition::crud("/api/v2/help_center/sections").with_deploy_as_field("section"),
        );
        FilterContext::new(Arc::new(config), client, Arc::new(InMemoryElementSource::new()))
    }

    fn instance(type_name: &str, name: &str, value: JsonValue) -> InstanceElement {
        InstanceElement::new(name, &ElemId::type_id("zendesk", type_name), values_from_json(value))
    }

    #[tokio::test]
    async fn test_on_fetch_lists_children_in_position_order() {
        let section = |name: &str, id: u64, category_id: u64, position: u64| {
            let value = json!({"id": id, "category_id": category_id, "position": position});
            Element::Instance(instance("section", name, value))
        };
        let mut elements = vec![
            Element::Instance(instance("category", "general", json!({"id": 1}))),
            section("late", 10, 1, 2),
            section("early", 11, 1, 0),
            section("other", 12, 2, 0),
        ];
        let mut filter = ChildOrderFilter::new(&context(Arc::default()));
        filter.on_fetch(&mut elements).await.unwrap();

        let list = elements[0].as_instance().unwrap().get("sections").unwrap();
        let names: Vec<&str> = list
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_reference().unwrap().elem_id.name())
            .collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_on_fetch_skipped_when_guide_disabled() {
        let client = Arc::new(RecordingClient::default());
        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        config.fetch.guide_enabled = false;
        config.filters.child_order.push(rule());
        let ctx =
            FilterContext::new(Arc::new(config), client, Arc::new(InMemoryElementSource::new()));
        let mut elements =
            vec![Element::Instance(instance("category", "general", json!({"id": 1})))];
        ChildOrderFilter::new(&ctx).on_fetch(&mut elements).await.unwrap();
        assert!(elements[0].as_instance().unwrap().get("sections").is_none());
    }

    #[tokio::test]
    async fn test_deploy_turns_reorder_into_position_updates() {
        let a = instance("section", "a", json!({"id": 10, "position": 0}));
        let b = instance("section", "b", json!({"id": 20, "position": 1}));
        let mut before = instance("category", "general", json!({"id": 1}));
        let list = |order: [&InstanceElement; 2]| {
            Value::List(order.iter().map(|s| Value::Reference(s.to_reference())).collect())
        };
        before.value.insert("sections".into(), list([&a, &b]));
        let mut after = before.clone();
        after.value.insert("sections".into(), list([&b, &a]));
        let unrelated = Change::Addition {
            after: instance("group", "support", json!({"name": "Support"})),
        };

        let client = Arc::new(RecordingClient::default());
        let mut filter = ChildOrderFilter::new(&context(Arc::clone(&client)));
        let output = filter
            .deploy(vec![Change::Modification { before, after }, unrelated])
            .await
            .unwrap();

        assert!(output.deploy_result.errors.is_empty());
        assert_eq!(output.deploy_result.applied_changes.len(), 1);
        assert_eq!(output.leftover_changes.len(), 1);
        assert_eq!(output.leftover_changes[0].data().type_name(), "group");

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, HttpMethod::Put);
        assert_eq!(calls[0].1, "/api/v2/help_center/sections/20");
        assert_eq!(calls[0].2, Some(json!({"section": {"id": 20, "position": 0}})));
        assert_eq!(calls[1].1, "/api/v2/help_center/sections/10");
    }
}
