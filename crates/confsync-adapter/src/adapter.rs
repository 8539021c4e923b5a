//! Adapter entry point
//!
//! Ties configuration, API client, element source, filter list and change
//! validators together. Every fetch or deploy call builds a fresh pipeline so
//! filters never carry state from one cycle to the next.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use confsync_elements::change::InstanceChange;
use confsync_elements::element::{Element, ElementSource};

use crate::client::{ApiClient, RestApiClient};
use crate::config::AdapterConfig;
use crate::error::AdapterResult;
use crate::filter::{DeployResult, FilterContext, FilterCreator};
use crate::filters::default_filters;
use crate::pipeline::{FetchResult, FilterPipeline};
use crate::validators::{default_validators, ChangeValidator};

pub struct Adapter {
    config: Arc<AdapterConfig>,
    client: Arc<dyn ApiClient>,
    element_source: Arc<dyn ElementSource>,
    creators: Vec<FilterCreator>,
    validators: Vec<Box<dyn ChangeValidator>>,
}

impl Adapter {
    /// Create an adapter with the standard filters and validators.
    pub fn new(
        config: AdapterConfig,
        client: Arc<dyn ApiClient>,
        element_source: Arc<dyn ElementSource>,
    ) -> Self {
        let validators = default_validators(&config.adapter, &config.validators);
        Self {
            config: Arc::new(config),
            client,
            element_source,
            creators: default_filters(),
            validators,
        }
    }

    /// Create an adapter talking HTTP to the configured base URL.
    pub fn from_config(
        config: AdapterConfig,
        element_source: Arc<dyn ElementSource>,
    ) -> AdapterResult<Self> {
        config.validate()?;
        let client = RestApiClient::new(&config.client)?;
        Ok(Self::new(config, Arc::new(client), element_source))
    }

    /// Replace the filter list.
    #[must_use]
    pub fn with_filters(mut self, creators: Vec<FilterCreator>) -> Self {
        self.creators = creators;
        self
    }

    /// Replace the change validators.
    #[must_use]
    pub fn with_validators(mut self, validators: Vec<Box<dyn ChangeValidator>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn pipeline(&self) -> FilterPipeline {
        let ctx = FilterContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.client),
            Arc::clone(&self.element_source),
        );
        FilterPipeline::new(&ctx, &self.creators)
    }

    /// Normalize raw fetched elements.
    ///
    /// Instances of excluded types are dropped before any filter runs.
    #[instrument(
        skip(self, elements),
        fields(adapter = %self.config.adapter, count = elements.len())
    )]
    pub async fn fetch(&self, elements: Vec<Element>) -> FetchResult {
        let fetch_config = &self.config.fetch;
        let elements: Vec<Element> = elements
            .into_iter()
            .filter(|element| match element {
                Element::Instance(inst) => fetch_config.is_type_included(inst.type_name()),
                Element::Object(_) => true,
            })
            .collect();
        let result = self.pipeline().on_fetch(elements).await;
        info!(
            elements = result.elements.len(),
            errors = result.errors.len(),
            "Fetch completed"
        );
        result
    }

    /// Validate and deploy a change batch.
    ///
    /// Changes with error diagnostics from a validator are withheld from the
    /// pipeline; all validator diagnostics come first in the result.
    #[instrument(
        skip(self, changes),
        fields(adapter = %self.config.adapter, count = changes.len())
    )]
    pub async fn deploy(&self, changes: Vec<InstanceChange>) -> DeployResult {
        let mut diagnostics = Vec::new();
        for validator in &self.validators {
            diagnostics.extend(validator.validate(&changes, self.element_source.as_ref()).await);
        }

        let blocked: HashSet<String> = diagnostics
            .iter()
            .filter(|d| d.is_error())
            .filter_map(|d| d.elem_id.as_ref())
            .map(|id| id.create_top_level_parent_id().0.full_name())
            .collect();
        let (withheld, allowed): (Vec<_>, Vec<_>) = changes
            .into_iter()
            .partition(|change| blocked.contains(&change.elem_id().full_name()));
        if !withheld.is_empty() {
            warn!(count = withheld.len(), "Changes withheld by validators");
        }

        let mut result = self.pipeline().deploy(allowed).await;
        diagnostics.append(&mut result.errors);
        result.errors = diagnostics;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiResponse, HttpError, HttpMethod};
    use crate::config::TypeApiDefinition;
    use confsync_elements::change::Change;
    use confsync_elements::element::{InMemoryElementSource, InstanceElement};
    use confsync_elements::ids::ElemId;
    use confsync_elements::value::values_from_json;
    use serde_json::{json, Value as JsonValue};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<(HttpMethod, String)>>,
    }

    #[async_trait::async_trait]
    impl ApiClient for RecordingClient {
        async fn request(
            &self,
            method: HttpMethod,
            url: &str,
            _body: Option<JsonValue>,
        ) -> Result<ApiResponse, HttpError> {
            self.calls.lock().unwrap().push((method, url.to_string()));
            Ok(ApiResponse::ok(json!({"group": {"id": 99}})))
        }
    }

    fn config() -> AdapterConfig {
        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        config.fetch.exclude_types.push("ticket".into());
        config.validators.default_protected_types.push("group".into());
        config.api_definitions = config.api_definitions.with_type(
            "group",
            TypeApiDefinition::crud("/api/v2/groups").with_deploy_as_field("group"),
        );
        config
    }

    fn group(name: &str, value: JsonValue) -> InstanceElement {
        InstanceElement::new(name, &ElemId::type_id("zendesk", "group"), values_from_json(value))
    }

    fn adapter(client: Arc<RecordingClient>) -> Adapter {
        Adapter::new(config(), client, Arc::new(InMemoryElementSource::new()))
    }

    #[tokio::test]
    async fn test_fetch_drops_excluded_types() {
        let adapter = adapter(Arc::default());
        let elements = vec![
            Element::Instance(group("support", json!({"id": 1}))),
            Element::Instance(InstanceElement::new(
                "t1",
                &ElemId::type_id("zendesk", "ticket"),
                values_from_json(json!({"id": 5})),
            )),
        ];
        let result = adapter.fetch(elements).await;
        assert!(result.errors.is_empty());
        assert_eq!(result.elements.len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_withholds_invalid_changes() {
        let client = Arc::new(RecordingClient::default());
        let adapter = adapter(Arc::clone(&client));
        let changes = vec![
            Change::Removal {
                before: group("default", json!({"id": 1, "name": "Default", "default": true})),
            },
            Change::Addition {
                after: group("vip", json!({"name": "VIP"})),
            },
        ];

        let result = adapter.deploy(changes).await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Default group cannot be deleted");
        assert_eq!(result.applied_changes.len(), 1);
        assert_eq!(result.applied_changes[0].elem_id().name(), "vip");

        let calls = client.calls.lock().unwrap();
        assert_eq!(*calls, vec![(HttpMethod::Post, "/api/v2/groups".to_string())]);
    }
}
