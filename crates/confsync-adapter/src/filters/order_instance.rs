//! Child order as a standalone instance.
//!
//! Some children are reordered through one bulk endpoint instead of per-child
//! position updates. For those, fetch adds a `<child_type>_order` instance per
//! parent holding the ordered child references, and deploying it issues a
//! single reorder request.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

use confsync_elements::change::InstanceChange;
use confsync_elements::element::{Element, InstanceElement};
use confsync_elements::ids::ElemId;
use confsync_elements::schema::{ObjectType, TypeRef};
use confsync_elements::value::{Value, Values};

use crate::client::ApiClient;
use crate::config::OrderInstanceRule;
use crate::deployment::{deploy_changes, fill_url_placeholders, partition_changes, ChangeHandler};
use crate::error::{AdapterError, AdapterResult};
use crate::filter::{Filter, FilterContext, FilterDeployOutput, FilterPhase};
use crate::filters::instances_of;
use crate::ordering::order_children_by_position;

const IDS_FIELD: &str = "ids";

struct ReorderHandler {
    rules: Vec<OrderInstanceRule>,
    client: Arc<dyn ApiClient>,
}

impl ReorderHandler {
    fn rule_for(&self, type_name: &str) -> Option<&OrderInstanceRule> {
        self.rules.iter().find(|rule| rule.order_type_name() == type_name)
    }
}

#[async_trait]
impl ChangeHandler for ReorderHandler {
    async fn handle(&self, change: &mut InstanceChange) -> AdapterResult<()> {
        let order = change.data();
        if change.is_removal() {
            debug!(elem_id = %order.elem_id, "Order removed with its parent");
            return Ok(());
        }
        let rule = self.rule_for(order.type_name()).ok_or_else(|| {
            AdapterError::deploy_change(&order.elem_id, "no reorder rule for type")
        })?;

        let parent = order
            .parents()
            .first()
            .and_then(|parent| parent.resolved_value())
            .map(Value::to_json)
            .transpose()?
            .filter(|parent| {
                parent
                    .get(&rule.parent_key_field)
                    .is_some_and(|key| !key.is_null())
            })
            .ok_or_else(|| AdapterError::deploy_change(&order.elem_id, "parent key is undefined"))?;
        let url = fill_url_placeholders(&rule.url, &parent)
            .map_err(|e| AdapterError::deploy_change(&order.elem_id, e))?;

        let ids = match order.get(IDS_FIELD) {
            Some(ids) => ids.to_json()?,
            None => json!([]),
        };
        let response = self.client.put(&url, json!({ "ids": ids })).await?;
        if response.status != 200 {
            return Err(AdapterError::deploy_change(
                &order.elem_id,
                format!("reorder request failed, {}", response.data),
            ));
        }
        Ok(())
    }
}

pub struct OrderInstanceFilter {
    adapter: String,
    handler: ReorderHandler,
    max_concurrency: usize,
}

impl OrderInstanceFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            adapter: ctx.adapter().to_string(),
            handler: ReorderHandler {
                rules: ctx.config.filters.order_instances.clone(),
                client: Arc::clone(&ctx.client),
            },
            max_concurrency: ctx.config.client.max_concurrent_requests,
        }
    }

    fn order_instance(
        &self,
        elements: &[Element],
        rule: &OrderInstanceRule,
        parent: &InstanceElement,
    ) -> InstanceElement {
        let mut children: Vec<&InstanceElement> = instances_of(elements, &rule.child_type)
            .filter(|child| child.parents().iter().any(|p| p.elem_id == parent.elem_id))
            .collect();
        order_children_by_position(&mut children, &rule.position_field, "created_at");

        let mut value = Values::new();
        value.insert(
            IDS_FIELD.to_string(),
            Value::List(
                children
                    .into_iter()
                    .map(|child| Value::Reference(child.to_reference()))
                    .collect(),
            ),
        );
        InstanceElement::new(
            format!("{}_order", parent.elem_id.name()),
            &ElemId::type_id(self.adapter.as_str(), rule.order_type_name().as_str()),
            value,
        )
        .with_parent(parent.to_reference())
    }
}

#[async_trait]
impl Filter for OrderInstanceFilter {
    fn name(&self) -> &str {
        "order_instance"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::OnFetch, FilterPhase::Deploy]
    }

    async fn on_fetch(&mut self, elements: &mut Vec<Element>) -> AdapterResult<()> {
        let mut added = Vec::new();
        for rule in &self.handler.rules {
            let order_type =
                ElemId::type_id(self.adapter.as_str(), rule.order_type_name().as_str());
            let child_type = ElemId::type_id(self.adapter.as_str(), rule.child_type.as_str());
            added.push(Element::Object(
                ObjectType::new(order_type)
                    .with_field(IDS_FIELD, TypeRef::list(TypeRef::object(&child_type))),
            ));
            let all: &[Element] = elements;
            for parent in instances_of(all, &rule.parent_type) {
                added.push(Element::Instance(self.order_instance(all, rule, parent)));
            }
        }
        debug!(count = added.len(), "Added order instances");
        elements.extend(added);
        Ok(())
    }

    #[instrument(skip(self, changes), fields(count = changes.len()))]
    async fn deploy(&mut self, changes: Vec<InstanceChange>) -> AdapterResult<FilterDeployOutput> {
        let (relevant, leftover_changes) = partition_changes(changes, |change| {
            self.handler.rule_for(change.data().type_name()).is_some()
        });
        let deploy_result = deploy_changes(relevant, &self.handler, self.max_concurrency).await;
        Ok(FilterDeployOutput {
            deploy_result,
            leftover_changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiResponse, HttpError, HttpMethod};
    use crate::config::AdapterConfig;
    use confsync_elements::change::Change;
    use confsync_elements::element::InMemoryElementSource;
    use confsync_elements::value::values_from_json;
    use serde_json::Value as JsonValue;
    use std::sync::Mutex;

    struct ReorderClient {
        status: u16,
        calls: Mutex<Vec<(String, Option<JsonValue>)>>,
    }

    impl ReorderClient {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ApiClient for ReorderClient {
        async fn request(
            &self,
            _method: HttpMethod,
            url: &str,
            body: Option<JsonValue>,
        ) -> Result<ApiResponse, HttpError> {
            self.calls.lock().unwrap().push((url.to_string(), body));
            Ok(ApiResponse::new(self.status, json!({"error": "nope"})))
        }
    }

    fn context(client: Arc<ReorderClient>) -> FilterContext {
        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        config.filters.order_instances.push(OrderInstanceRule {
            parent_type: "custom_object".into(),
            child_type: "custom_object_field".into(),
            parent_key_field: "key".into(),
            url: "/api/v2/custom_objects/{key}/fields/reorder".into(),
            position_field: "position".into(),
        });
        FilterContext::new(Arc::new(config), client, Arc::new(InMemoryElementSource::new()))
    }

    fn instance(type_name: &str, name: &str, value: JsonValue) -> InstanceElement {
        InstanceElement::new(name, &ElemId::type_id("zendesk", type_name), values_from_json(value))
    }

    fn fetched() -> Vec<Element> {
        let parent = instance("custom_object", "car", json!({"key": "car"}));
        let wheels = instance("custom_object_field", "car__wheels", json!({"id": 2, "position": 1}))
            .with_parent(parent.to_reference());
        let color = instance("custom_object_field", "car__color", json!({"id": 1, "position": 0}))
            .with_parent(parent.to_reference());
        vec![
            Element::Instance(parent),
            Element::Instance(wheels),
            Element::Instance(color),
        ]
    }

    fn order_of(elements: &[Element]) -> InstanceElement {
        instances_of(elements, "custom_object_field_order")
            .next()
            .cloned()
            .expect("order instance should be added")
    }

    #[tokio::test]
    async fn test_on_fetch_adds_order_instance() {
        let mut elements = fetched();
        let mut filter = OrderInstanceFilter::new(&context(ReorderClient::new(200)));
        filter.on_fetch(&mut elements).await.unwrap();

        assert_eq!(elements.len(), 5);
        let order = order_of(&elements);
        assert_eq!(
            order.elem_id.full_name(),
            "zendesk.custom_object_field_order.instance.car_order"
        );
        assert_eq!(order.parents()[0].elem_id.name(), "car");
        assert_eq!(order.get("ids").unwrap().to_json().unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_deploy_sends_single_reorder_request() {
        let client = ReorderClient::new(200);
        let mut filter = OrderInstanceFilter::new(&context(Arc::clone(&client)));
        let mut elements = fetched();
        filter.on_fetch(&mut elements).await.unwrap();
        let before = order_of(&elements);
        let mut after = before.clone();
        if let Some(ids) = after.value.get_mut("ids").and_then(Value::as_list_mut) {
            ids.reverse();
        }
        let other = Change::Addition {
            after: instance("custom_object", "bike", json!({"key": "bike"})),
        };

        let output = filter
            .deploy(vec![Change::Modification { before, after }, other])
            .await
            .unwrap();
        assert!(output.deploy_result.errors.is_empty());
        assert_eq!(output.deploy_result.applied_changes.len(), 1);
        assert_eq!(output.leftover_changes.len(), 1);

        let calls = client.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(
                "/api/v2/custom_objects/car/fields/reorder".to_string(),
                Some(json!({"ids": [2, 1]}))
            )]
        );
    }

    #[tokio::test]
    async fn test_deploy_reports_failed_reorder() {
        let client = ReorderClient::new(400);
        let mut filter = OrderInstanceFilter::new(&context(Arc::clone(&client)));
        let mut elements = fetched();
        filter.on_fetch(&mut elements).await.unwrap();
        let order = order_of(&elements);

        let output = filter
            .deploy(vec![Change::Addition { after: order }])
            .await
            .unwrap();
        assert!(output.deploy_result.applied_changes.is_empty());
        let message = &output.deploy_result.errors[0].message;
        assert!(message.contains("reorder request failed"), "{message}");
    }

    #[tokio::test]
    async fn test_deploy_without_parent_key() {
        let client = ReorderClient::new(200);
        let mut filter = OrderInstanceFilter::new(&context(Arc::clone(&client)));
        let orphan = instance("custom_object_field_order", "lost_order", json!({"ids": []}));

        let output = filter
            .deploy(vec![Change::Addition { after: orphan }])
            .await
            .unwrap();
        assert!(output.deploy_result.errors[0].message.ends_with("parent key is undefined"));
        assert!(client.calls.lock().unwrap().is_empty());
    }
}
