//! Deployment change router
//!
//! Splits a change batch into the changes a stage handles and the leftover
//! rest, deploys the handled ones concurrently and turns per-change failures
//! into element-scoped diagnostics.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use confsync_elements::change::{ChangeAction, InstanceChange};
use confsync_elements::diagnostics::Diagnostic;
use confsync_elements::ids::ElemId;
use confsync_elements::value::{values_to_json, Value};

use crate::client::{ApiClient, HttpMethod};
use crate::config::{AdapterConfig, TypeApiDefinition};
use crate::error::{AdapterError, AdapterResult};
use crate::filter::{DeployResult, FilterContext, FilterDeployOutput};

/// Deploys a single change, possibly updating it with remote state.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn handle(&self, change: &mut InstanceChange) -> AdapterResult<()>;
}

/// Split changes into `(relevant, leftover)`, keeping input order in both.
pub fn partition_changes<P>(
    changes: Vec<InstanceChange>,
    mut predicate: P,
) -> (Vec<InstanceChange>, Vec<InstanceChange>)
where
    P: FnMut(&InstanceChange) -> bool,
{
    changes.into_iter().partition(|change| predicate(change))
}

/// Format a per-change deploy failure.
///
/// A JSON object body returned by the API is appended pretty-printed.
pub fn deploy_error_message(elem_id: &ElemId, error: &AdapterError) -> String {
    let mut message = format!("Deployment of {} failed: {}", elem_id.full_name(), error);
    if let AdapterError::Http(http) = error {
        if let Some(data @ JsonValue::Object(_)) = &http.data {
            if let Ok(pretty) = serde_json::to_string_pretty(data) {
                message.push('\n');
                message.push_str(&pretty);
            }
        }
    }
    message
}

/// Deploy changes through `handler`, at most `max_concurrency` at a time.
///
/// Applied changes keep their input order. A failing change yields one error
/// diagnostic and never prevents its siblings from deploying.
#[instrument(skip(changes, handler), fields(count = changes.len()))]
pub async fn deploy_changes(
    changes: Vec<InstanceChange>,
    handler: &dyn ChangeHandler,
    max_concurrency: usize,
) -> DeployResult {
    let outcomes: Vec<(InstanceChange, AdapterResult<()>)> = stream::iter(changes)
        .map(|mut change| async move {
            let outcome = handler.handle(&mut change).await;
            (change, outcome)
        })
        .buffered(max_concurrency.max(1))
        .collect()
        .await;

    let mut result = DeployResult::new();
    for (change, outcome) in outcomes {
        match outcome {
            Ok(()) => result.applied_changes.push(change),
            Err(e) => {
                let elem_id = change.elem_id().clone();
                warn!(elem_id = %elem_id, error = %e, "Change deployment failed");
                result
                    .errors
                    .push(Diagnostic::error(&elem_id, deploy_error_message(&elem_id, &e)));
            }
        }
    }
    debug!(
        applied = result.applied_changes.len(),
        errors = result.errors.len(),
        "Deployed change batch"
    );
    result
}

/// Deploy additions and modifications first, then removals.
pub async fn deploy_removals_last(
    changes: Vec<InstanceChange>,
    handler: &dyn ChangeHandler,
    max_concurrency: usize,
) -> DeployResult {
    let (removals, others) = partition_changes(changes, InstanceChange::is_removal);
    let mut result = deploy_changes(others, handler, max_concurrency).await;
    result.extend(deploy_changes(removals, handler, max_concurrency).await);
    result
}

/// Partition by `predicate`, deploy the relevant changes and return the rest.
pub async fn route_changes<P>(
    changes: Vec<InstanceChange>,
    predicate: P,
    handler: &dyn ChangeHandler,
    max_concurrency: usize,
) -> FilterDeployOutput
where
    P: FnMut(&InstanceChange) -> bool,
{
    let (relevant, leftover_changes) = partition_changes(changes, predicate);
    FilterDeployOutput {
        deploy_result: deploy_changes(relevant, handler, max_concurrency).await,
        leftover_changes,
    }
}

/// Fill `{field}` placeholders of a URL from an instance value.
pub fn fill_url_placeholders(url: &str, values: &JsonValue) -> Result<String, String> {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in url {url}"))?;
        let name = &after[..end];
        let replacement = match values.get(name) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => return Err(format!("missing value for url placeholder {{{name}}}")),
        };
        out.push_str(&replacement);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Deploys changes through the configured endpoint table.
pub struct ApiChangeDeployer {
    config: Arc<AdapterConfig>,
    client: Arc<dyn ApiClient>,
}

impl ApiChangeDeployer {
    pub fn new(config: Arc<AdapterConfig>, client: Arc<dyn ApiClient>) -> Self {
        Self { config, client }
    }

    pub fn from_context(ctx: &FilterContext) -> Self {
        Self::new(Arc::clone(&ctx.config), Arc::clone(&ctx.client))
    }

    fn definition(&self, change: &InstanceChange) -> AdapterResult<&TypeApiDefinition> {
        let type_name = change.data().type_name();
        self.config.api_definitions.get(type_name).ok_or_else(|| {
            AdapterError::deploy_change(
                change.elem_id(),
                format!("no deploy definition for type {type_name}"),
            )
        })
    }

    fn request_body(definition: &TypeApiDefinition, value: JsonValue) -> JsonValue {
        let mut value = value;
        if let JsonValue::Object(map) = &mut value {
            for field in &definition.fields_to_ignore {
                map.remove(field);
            }
        }
        match &definition.deploy_as_field {
            Some(field) => {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(field.clone(), value);
                JsonValue::Object(wrapper)
            }
            None => value,
        }
    }

    fn returned_id<'a>(
        definition: &TypeApiDefinition,
        data: &'a JsonValue,
    ) -> Option<&'a JsonValue> {
        let wrapped = definition
            .deploy_as_field
            .as_ref()
            .and_then(|field| data.get(field));
        wrapped
            .unwrap_or(data)
            .get(&definition.id_field)
            .filter(|id| !id.is_null())
    }
}

#[async_trait]
impl ChangeHandler for ApiChangeDeployer {
    #[instrument(
        skip(self, change),
        fields(elem_id = %change.elem_id(), action = %change.action())
    )]
    async fn handle(&self, change: &mut InstanceChange) -> AdapterResult<()> {
        let definition = self.definition(change)?;
        let endpoint = match change.action() {
            ChangeAction::Add => definition.add.as_ref(),
            ChangeAction::Modify => definition.modify.as_ref(),
            ChangeAction::Remove => definition.remove.as_ref(),
        }
        .ok_or_else(|| {
            AdapterError::deploy_change(
                change.elem_id(),
                format!(
                    "{} is not supported for type {}",
                    change.action(),
                    change.data().type_name()
                ),
            )
        })?;

        let value = JsonValue::Object(values_to_json(&change.data().value)?);
        let url = fill_url_placeholders(&endpoint.url, &value)
            .map_err(|message| AdapterError::deploy_change(change.elem_id(), message))?;
        let body = match endpoint.method {
            HttpMethod::Get | HttpMethod::Delete => None,
            _ => Some(Self::request_body(definition, value)),
        };

        let response = self.client.request(endpoint.method, &url, body).await?;
        info!(url = %url, status = response.status, "Deployed change");

        if change.is_addition() {
            if let Some(id) = Self::returned_id(definition, &response.data) {
                let id_field = definition.id_field.clone();
                let id = Value::from(id.clone());
                if let Some(after) = change.after_mut() {
                    after.value.insert(id_field, id);
                }
            }
        }
        Ok(())
    }
}
