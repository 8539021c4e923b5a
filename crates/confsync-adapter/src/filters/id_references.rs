//! Raw id fields to references.
//!
//! On fetch, configured fields holding raw ids of other instances become
//! references; user ids become the user's email, which is stable across
//! accounts. Before deploy emails are mapped back to the target account's user
//! ids, falling back to the configured user when an email is unknown. After
//! deploy the emails are put back.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use confsync_elements::change::InstanceChange;
use confsync_elements::element::Element;
use confsync_elements::resolver::{LookupTable, ReferenceResolver, Resolution};
use confsync_elements::value::Value;

use crate::client::ApiClient;
use crate::config::{IdReferenceRule, DEPLOYER_FALLBACK_VALUE};
use crate::error::AdapterResult;
use crate::filter::{Filter, FilterContext, FilterPhase};
use crate::filters::instances_of;

const CURRENT_USER_URL: &str = "/api/v2/users/me";

/// A remote user as listed by the users endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Value,
    pub email: String,
}

/// List users from `url`; entries without an id or email are skipped.
pub async fn get_users(client: &dyn ApiClient, url: &str) -> AdapterResult<Vec<User>> {
    let response = client.get(url).await?;
    let users = response
        .data
        .get("users")
        .and_then(JsonValue::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(|user| {
                    let email = user.get("email")?.as_str()?.to_string();
                    let id = user.get("id").filter(|id| !id.is_null())?.clone();
                    Some(User {
                        id: Value::from(id),
                        email,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(users)
}

/// Resolve the configured missing-user fallback to an email.
///
/// `##DEPLOYER##` stands for the authenticated user.
pub async fn get_user_fallback_value(
    client: &dyn ApiClient,
    fallback: &str,
) -> AdapterResult<Option<String>> {
    if fallback != DEPLOYER_FALLBACK_VALUE {
        return Ok(Some(fallback.to_string()));
    }
    let response = client.get(CURRENT_USER_URL).await?;
    Ok(response
        .data
        .get("user")
        .and_then(|user| user.get("email"))
        .and_then(JsonValue::as_str)
        .map(str::to_string))
}

/// Walk `path` below `value`, applying `f` to every scalar reached; lists
/// along the way are descended element-wise.
fn for_each_at_path(value: &mut Value, path: &[&str], f: &mut dyn FnMut(&mut Value)) {
    match (path.split_first(), value) {
        (_, Value::List(items)) => {
            for item in items {
                for_each_at_path(item, path, f);
            }
        }
        (Some((first, rest)), Value::Map(map)) => {
            if let Some(child) = map.get_mut(*first) {
                for_each_at_path(child, rest, f);
            }
        }
        (None, scalar) => f(scalar),
        (Some(_), _) => {}
    }
}

pub struct IdReferenceFilter {
    adapter: String,
    rules: Vec<IdReferenceRule>,
    users_url: String,
    enable_missing_references: bool,
    missing_user_fallback: Option<String>,
    client: Arc<dyn ApiClient>,
    /// Email to user id, loaded once per deploy cycle.
    user_ids: Option<HashMap<String, Value>>,
    /// Field values replaced by pre-deploy, keyed by element full name.
    originals: HashMap<String, Vec<(String, Value)>>,
}

impl IdReferenceFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            adapter: ctx.adapter().to_string(),
            rules: ctx.config.filters.id_references.clone(),
            users_url: ctx.config.filters.users_url.clone(),
            enable_missing_references: ctx.config.fetch.enable_missing_references,
            missing_user_fallback: ctx.config.deploy.default_missing_user_fallback.clone(),
            client: Arc::clone(&ctx.client),
            user_ids: None,
            originals: HashMap::new(),
        }
    }

    fn resolver_for(
        &self,
        rule: &IdReferenceRule,
        elements: &[Element],
        users: &LookupTable,
    ) -> ReferenceResolver {
        let resolver = ReferenceResolver::new(self.adapter.as_str(), self.enable_missing_references)
            .with_table(LookupTable::from_instances(
                format!("{}_by_id", rule.target_type),
                instances_of(elements, &rule.target_type),
                "id",
            ));
        if rule.users {
            resolver.with_table(users.clone())
        } else {
            resolver
        }
    }

    async fn load_user_ids(&mut self) -> AdapterResult<&HashMap<String, Value>> {
        if self.user_ids.is_none() {
            let users = get_users(self.client.as_ref(), &self.users_url).await?;
            debug!(count = users.len(), "Loaded users for deploy");
            self.user_ids = Some(users.into_iter().map(|u| (u.email, u.id)).collect());
        }
        Ok(self.user_ids.get_or_insert_with(HashMap::new))
    }

    fn user_rules_for(&self, type_name: &str) -> Vec<IdReferenceRule> {
        self.rules
            .iter()
            .filter(|rule| rule.users && rule.type_name == type_name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Filter for IdReferenceFilter {
    fn name(&self) -> &str {
        "id_references"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::OnFetch, FilterPhase::PreDeploy, FilterPhase::OnDeploy]
    }

    async fn on_fetch(&mut self, elements: &mut Vec<Element>) -> AdapterResult<()> {
        if self.rules.is_empty() {
            return Ok(());
        }

        let mut users = LookupTable::new("users_by_id");
        if self.rules.iter().any(|rule| rule.users) {
            match get_users(self.client.as_ref(), &self.users_url).await {
                Ok(list) => {
                    for user in list {
                        if let Some(key) = user.id.to_key_string() {
                            users.insert_literal(key, user.email);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Failed to list users, user ids stay raw"),
            }
        }

        for rule in &self.rules {
            let resolver = self.resolver_for(rule, elements, &users);
            let path = rule.path();
            let mut resolved = 0usize;
            for inst in elements
                .iter_mut()
                .filter_map(Element::as_instance_mut)
                .filter(|inst| inst.type_name() == rule.type_name)
            {
                let Some((first, rest)) = path.split_first() else {
                    continue;
                };
                let Some(field) = inst.value.get_mut(*first) else {
                    continue;
                };
                for_each_at_path(field, rest, &mut |raw: &mut Value| {
                    if matches!(raw, Value::Reference(_)) {
                        return;
                    }
                    match resolver.resolve_value(raw, &rule.target_type) {
                        None | Some(Resolution::Unresolved(_)) => {}
                        Some(resolution) => {
                            resolved += 1;
                            *raw = resolution.into_value();
                        }
                    }
                });
            }
            debug!(
                type_name = %rule.type_name,
                field = %rule.field,
                resolved,
                "Resolved id references"
            );
        }
        Ok(())
    }

    async fn pre_deploy(&mut self, changes: &mut Vec<InstanceChange>) -> AdapterResult<()> {
        let has_user_fields = changes
            .iter()
            .any(|c| !c.is_removal() && !self.user_rules_for(c.data().type_name()).is_empty());
        if !has_user_fields {
            return Ok(());
        }

        let user_ids = self.load_user_ids().await?.clone();
        let fallback_id = match self.missing_user_fallback.clone() {
            Some(fallback) => match get_user_fallback_value(self.client.as_ref(), &fallback).await {
                Ok(email) => email.and_then(|email| user_ids.get(&email).cloned()),
                Err(e) => {
                    warn!(error = %e, "Failed to resolve missing user fallback");
                    None
                }
            },
            None => None,
        };
        if self.missing_user_fallback.is_some() && fallback_id.is_none() {
            warn!("Missing user fallback does not match any user");
        }

        for change in changes.iter_mut().filter(|c| !c.is_removal()) {
            let rules = self.user_rules_for(change.data().type_name());
            let inst = change.data_mut();
            let key = inst.elem_id.full_name();
            for rule in rules {
                let path = rule.path();
                let Some((first, rest)) = path.split_first() else {
                    continue;
                };
                let Some(field) = inst.value.get_mut(*first) else {
                    continue;
                };
                let original = field.clone();
                let mut replaced = false;
                for_each_at_path(field, rest, &mut |raw: &mut Value| {
                    let Some(email) = raw.as_str() else {
                        return;
                    };
                    let id = user_ids.get(email).cloned().or_else(|| fallback_id.clone());
                    match id {
                        Some(id) => {
                            if !user_ids.contains_key(email) {
                                info!(email, "Replacing unknown user with fallback");
                            }
                            *raw = id;
                            replaced = true;
                        }
                        None => warn!(email, "Unknown user, leaving email as is"),
                    }
                });
                if replaced {
                    self.originals
                        .entry(key.clone())
                        .or_default()
                        .push(((*first).to_string(), original));
                }
            }
        }
        Ok(())
    }

    async fn on_deploy(&mut self, changes: &mut Vec<InstanceChange>) -> AdapterResult<()> {
        for change in changes.iter_mut().filter(|c| !c.is_removal()) {
            let inst = change.data_mut();
            if let Some(originals) = self.originals.remove(&inst.elem_id.full_name()) {
                for (field, original) in originals.into_iter().rev() {
                    inst.value.insert(field, original);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiResponse, HttpError, HttpMethod};
    use crate::config::AdapterConfig;
    use confsync_elements::change::Change;
    use confsync_elements::element::{InMemoryElementSource, InstanceElement};
    use confsync_elements::ids::ElemId;
    use confsync_elements::value::values_from_json;
    use serde_json::json;

    struct UsersClient;

    #[async_trait]
    impl ApiClient for UsersClient {
        async fn request(
            &self,
            _method: HttpMethod,
            url: &str,
            _body: Option<JsonValue>,
        ) -> Result<ApiResponse, HttpError> {
            match url {
                "/api/v2/users" => Ok(ApiResponse::ok(json!({
                    "users": [
                        {"id": 7, "email": "agent@acme.com"},
                        {"id": 8, "email": "admin@acme.com"},
                        {"id": 9},
                    ]
                }))),
                "/api/v2/users/me" => Ok(ApiResponse::ok(json!({
                    "user": {"id": 8, "email": "admin@acme.com"}
                }))),
                _ => Err(HttpError::new(Some(404), "Not Found")),
            }
        }
    }

    fn context(fallback: Option<&str>, tolerant: bool) -> FilterContext {
        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        config.fetch.enable_missing_references = tolerant;
        config.deploy.default_missing_user_fallback = fallback.map(str::to_string);
        config.filters.id_references = vec![
            IdReferenceRule {
                type_name: "trigger".into(),
                field: "conditions.group_id".into(),
                target_type: "group".into(),
                users: false,
            },
            IdReferenceRule {
                type_name: "trigger".into(),
                field: "actions.assignee_id".into(),
                target_type: "user".into(),
                users: true,
            },
        ];
        FilterContext::new(
            Arc::new(config),
            Arc::new(UsersClient),
            Arc::new(InMemoryElementSource::new()),
        )
    }

    fn instance(type_name: &str, name: &str, value: JsonValue) -> InstanceElement {
        InstanceElement::new(name, &ElemId::type_id("zendesk", type_name), values_from_json(value))
    }

    fn trigger(assignee: JsonValue) -> InstanceElement {
        instance(
            "trigger",
            "notify",
            json!({
                "conditions": [{"group_id": 123}, {"group_id": 456}],
                "actions": [{"assignee_id": assignee}],
            }),
        )
    }

    #[tokio::test]
    async fn test_on_fetch_resolves_instances_and_users() {
        let mut elements = vec![
            Element::Instance(instance("group", "support", json!({"id": 123}))),
            Element::Instance(trigger(json!(7))),
        ];
        let mut filter = IdReferenceFilter::new(&context(None, true));
        filter.on_fetch(&mut elements).await.unwrap();

        let trigger = elements[1].as_instance().unwrap();
        let conditions = trigger.get("conditions").unwrap().as_list().unwrap();
        let first = conditions[0].get("group_id").unwrap().as_reference().unwrap();
        assert_eq!(first.elem_id.full_name(), "zendesk.group.instance.support");
        let second = conditions[1].get("group_id").unwrap().as_reference().unwrap();
        assert!(second.is_missing());
        assert_eq!(second.elem_id.full_name(), "zendesk.group.instance.missing_456");

        let actions = trigger.get("actions").unwrap().as_list().unwrap();
        assert_eq!(actions[0].get("assignee_id"), Some(&Value::from("agent@acme.com")));
    }

    #[tokio::test]
    async fn test_on_fetch_keeps_raw_ids_when_not_tolerant() {
        let mut elements = vec![Element::Instance(trigger(json!(7)))];
        let mut filter = IdReferenceFilter::new(&context(None, false));
        filter.on_fetch(&mut elements).await.unwrap();
        let trigger = elements[0].as_instance().unwrap();
        let conditions = trigger.get("conditions").unwrap().as_list().unwrap();
        assert_eq!(conditions[0].get("group_id"), Some(&Value::from(123)));
    }

    #[tokio::test]
    async fn test_pre_deploy_maps_emails_and_on_deploy_restores() {
        let mut filter = IdReferenceFilter::new(&context(None, false));
        let mut changes = vec![Change::Addition {
            after: trigger(json!("agent@acme.com")),
        }];
        filter.pre_deploy(&mut changes).await.unwrap();
        let actions = changes[0].data().get("actions").unwrap().as_list().unwrap();
        assert_eq!(actions[0].get("assignee_id"), Some(&Value::from(7)));

        filter.on_deploy(&mut changes).await.unwrap();
        let actions = changes[0].data().get("actions").unwrap().as_list().unwrap();
        assert_eq!(actions[0].get("assignee_id"), Some(&Value::from("agent@acme.com")));
    }

    #[tokio::test]
    async fn test_pre_deploy_uses_deployer_fallback() {
        let mut filter = IdReferenceFilter::new(&context(Some(DEPLOYER_FALLBACK_VALUE), false));
        let mut changes = vec![Change::Addition {
            after: trigger(json!("gone@acme.com")),
        }];
        filter.pre_deploy(&mut changes).await.unwrap();
        let actions = changes[0].data().get("actions").unwrap().as_list().unwrap();
        assert_eq!(actions[0].get("assignee_id"), Some(&Value::from(8)));
    }

    #[tokio::test]
    async fn test_get_users_skips_incomplete_entries() {
        let users = get_users(&UsersClient, "/api/v2/users").await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "agent@acme.com");
        assert_eq!(
            get_user_fallback_value(&UsersClient, "fallback@acme.com").await.unwrap(),
            Some("fallback@acme.com".to_string())
        );
    }
}
