//! Adapter configuration
//!
//! Loaded from YAML with environment overrides. Besides client and fetch
//! options it carries the endpoint table used by the default deployer and the
//! per-filter configuration tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::client::HttpMethod;
use crate::error::{AdapterError, AdapterResult};

/// Placeholder fallback meaning "the authenticated user".
pub const DEPLOYER_FALLBACK_VALUE: &str = "##DEPLOYER##";

/// Top-level adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Adapter name; the first component of every element id.
    pub adapter: String,

    pub client: ClientConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub api_definitions: ApiDefinitions,

    #[serde(default)]
    pub filters: FilterSettings,

    #[serde(default)]
    pub validators: ValidatorSettings,
}

impl AdapterConfig {
    /// Create a configuration with defaults for everything but the adapter name and URL.
    #[must_use]
    pub fn new(adapter: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            client: ClientConfig::new(base_url),
            fetch: FetchConfig::default(),
            deploy: DeployConfig::default(),
            api_definitions: ApiDefinitions::default(),
            filters: FilterSettings::default(),
            validators: ValidatorSettings::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AdapterResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AdapterError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> AdapterResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("CONFSYNC_BASE_URL") {
            self.client.base_url = base_url;
        }
        if let Ok(flag) = std::env::var("CONFSYNC_ENABLE_MISSING_REFERENCES") {
            if let Ok(flag) = flag.parse() {
                self.fetch.enable_missing_references = flag;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AdapterResult<()> {
        if self.adapter.is_empty() {
            return Err(AdapterError::configuration("adapter name is required"));
        }
        self.client.validate()?;
        self.api_definitions.validate()?;
        for rule in &self.filters.order_instances {
            if !rule.url.contains('{') {
                return Err(AdapterError::configuration(format!(
                    "order url for {} must contain a placeholder",
                    rule.parent_type
                )));
            }
        }
        Ok(())
    }
}

/// API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the remote API (e.g., "https://acme.zendesk.com").
    pub base_url: String,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of concurrent deploy requests.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_requests() -> usize {
    10
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthConfig::None,
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Validate the client settings.
    pub fn validate(&self) -> AdapterResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(AdapterError::configuration(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(AdapterError::configuration(
                "max_concurrent_requests must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Authentication method configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication.
    #[default]
    None,

    /// Basic authentication (username/password).
    Basic {
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },

    /// Bearer token authentication.
    Bearer { token: String },
}

/// Fetch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Synthesize placeholder elements for unresolvable references.
    #[serde(default)]
    pub enable_missing_references: bool,

    #[serde(default = "default_true")]
    pub guide_enabled: bool,

    /// Type names to fetch; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enable_missing_references: false,
            guide_enabled: true,
            include_types: Vec::new(),
            exclude_types: Vec::new(),
        }
    }
}

impl FetchConfig {
    /// Whether instances of `type_name` take part in the fetch.
    pub fn is_type_included(&self, type_name: &str) -> bool {
        if self.exclude_types.iter().any(|t| t == type_name) {
            return false;
        }
        self.include_types.is_empty() || self.include_types.iter().any(|t| t == type_name)
    }
}

/// Deploy options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// User substituted for unknown users on deploy, or [`DEPLOYER_FALLBACK_VALUE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_missing_user_fallback: Option<String>,
}

/// Endpoint table used by the default deployer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiDefinitions {
    #[serde(default)]
    pub types: BTreeMap<String, TypeApiDefinition>,
}

impl ApiDefinitions {
    pub fn get(&self, type_name: &str) -> Option<&TypeApiDefinition> {
        self.types.get(type_name)
    }

    #[must_use]
    pub fn with_type(
        mut self,
        type_name: impl Into<String>,
        definition: TypeApiDefinition,
    ) -> Self {
        self.types.insert(type_name.into(), definition);
        self
    }

    fn validate(&self) -> AdapterResult<()> {
        for (type_name, definition) in &self.types {
            for endpoint in [&definition.add, &definition.modify, &definition.remove]
                .into_iter()
                .flatten()
            {
                if endpoint.url.is_empty() {
                    return Err(AdapterError::configuration(format!(
                        "empty deploy url for type {type_name}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// How to deploy one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeApiDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<EndpointDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify: Option<EndpointDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<EndpointDef>,

    /// Field holding the remote id.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Wrap the request body in an object under this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_as_field: Option<String>,

    /// Fields never sent to the API.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields_to_ignore: Vec<String>,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl Default for TypeApiDefinition {
    fn default() -> Self {
        Self {
            add: None,
            modify: None,
            remove: None,
            id_field: default_id_field(),
            deploy_as_field: None,
            fields_to_ignore: Vec::new(),
        }
    }
}

impl TypeApiDefinition {
    /// Standard CRUD endpoints under a collection URL.
    #[must_use]
    pub fn crud(collection_url: &str) -> Self {
        let item_url = format!("{}/{{id}}", collection_url.trim_end_matches('/'));
        Self {
            add: Some(EndpointDef::new(collection_url, HttpMethod::Post)),
            modify: Some(EndpointDef::new(item_url.clone(), HttpMethod::Put)),
            remove: Some(EndpointDef::new(item_url, HttpMethod::Delete)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_deploy_as_field(mut self, field: impl Into<String>) -> Self {
        self.deploy_as_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_fields_to_ignore(mut self, fields: Vec<String>) -> Self {
        self.fields_to_ignore = fields;
        self
    }
}

/// One deploy endpoint; `{field}` placeholders are filled from the instance value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDef {
    pub url: String,
    pub method: HttpMethod,
}

impl EndpointDef {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
        }
    }
}

/// Configuration tables of the reusable filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unordered_lists: Vec<UnorderedListRule>,

    /// Types whose removals deploy after their other changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removal_last_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_order: Vec<ChildOrderRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_templates: Vec<BodyTemplateRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_references: Vec<IdReferenceRule>,

    /// Endpoint listing users as `{users: [{id, email}]}`.
    #[serde(default = "default_users_url")]
    pub users_url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_instances: Vec<OrderInstanceRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locales: Vec<LocaleRule>,
}

fn default_users_url() -> String {
    "/api/v2/users".to_string()
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            unordered_lists: Vec::new(),
            removal_last_types: Vec::new(),
            child_order: Vec::new(),
            body_templates: Vec::new(),
            id_references: Vec::new(),
            users_url: default_users_url(),
            order_instances: Vec::new(),
            locales: Vec::new(),
        }
    }
}

/// A list field whose item order carries no meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnorderedListRule {
    pub type_name: String,
    pub field: String,
    /// Key of map items to sort by; scalars sort by value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
}

/// Parent types owning an ordered list of children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildOrderRule {
    pub parent_type: String,
    pub child_type: String,
    /// Field on the parent holding the ordered child references.
    pub order_field: String,
    /// Field on the child holding the parent id.
    pub parent_id_field: String,
    #[serde(default = "default_position_field")]
    pub position_field: String,
    #[serde(default = "default_created_at_field")]
    pub created_at_field: String,
}

fn default_position_field() -> String {
    "position".to_string()
}

fn default_created_at_field() -> String {
    "created_at".to_string()
}

/// A text field whose links are turned into references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyTemplateRule {
    pub type_name: String,
    pub field: String,
    /// Type whose `base_url_field` matches the scheme and host of links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url_type: Option<String>,
    #[serde(default = "default_base_url_field")]
    pub base_url_field: String,
    #[serde(default)]
    pub links: Vec<LinkRule>,
}

fn default_base_url_field() -> String {
    "brand_url".to_string()
}

/// A path prefix followed by the id of an instance of `target_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRule {
    pub prefix: String,
    pub target_type: String,
}

/// A field holding raw ids of other instances (or users).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdReferenceRule {
    pub type_name: String,
    /// Dot-separated path below the instance value.
    pub field: String,
    pub target_type: String,
    /// Ids may also be user ids, rendered as emails.
    #[serde(default)]
    pub users: bool,
}

impl IdReferenceRule {
    pub fn path(&self) -> Vec<&str> {
        self.field.split('.').collect()
    }
}

/// Children whose order is deployed through a dedicated endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInstanceRule {
    pub parent_type: String,
    pub child_type: String,
    /// Field of the parent filled into the URL placeholder.
    #[serde(default = "default_parent_key_field")]
    pub parent_key_field: String,
    /// URL with a `{<parent_key_field>}` placeholder.
    pub url: String,
    #[serde(default = "default_position_field")]
    pub position_field: String,
}

fn default_parent_key_field() -> String {
    "key".to_string()
}

impl OrderInstanceRule {
    /// Type name of the synthesized order instances.
    pub fn order_type_name(&self) -> String {
        format!("{}_order", self.child_type)
    }
}

/// Locale fields resolved against per-brand language settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleRule {
    /// Type of the language settings instances, keyed by brand and locale.
    pub settings_type: String,
    #[serde(default = "default_brand_field")]
    pub brand_field: String,
    /// Types whose `locale` field is resolved.
    pub locale_types: Vec<String>,
    /// Types whose `source_locale` field is resolved as well.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_locale_types: Vec<String>,
}

fn default_brand_field() -> String {
    "brand".to_string()
}

/// Configuration tables of the change validators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Types whose `default: true` instance cannot be removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_protected_types: Vec<String>,

    /// Types that may be owned by an external source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_source_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_gates: Vec<FeatureGateRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_removals: Vec<StatusRemovalRule>,
}

/// A type that can only be deployed while a settings flag is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureGateRule {
    pub type_name: String,
    /// Type of the `_config` settings instance.
    pub settings_type: String,
    /// Dot-separated path of the boolean flag inside the settings value.
    pub setting_path: String,
    /// Gate only additions and modifications holding a matching action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionMatch>,
}

/// Matches list items of `list_field` whose `field` equals `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMatch {
    #[serde(default = "default_actions_field")]
    pub list_field: String,
    pub value: String,
}

fn default_actions_field() -> String {
    "actions".to_string()
}

impl ActionMatch {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            list_field: default_actions_field(),
            value: value.into(),
        }
    }
}

/// A type whose instances may only be removed while in one status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRemovalRule {
    pub type_name: String,
    #[serde(default = "default_status_field")]
    pub status_field: String,
    pub removable_status: String,
}

fn default_status_field() -> String {
    "status".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r###"
adapter: zendesk
client:
  base_url: https://acme.zendesk.com
  auth:
    type: bearer
    token: secret
fetch:
  enable_missing_references: true
  exclude_types: [ticket]
deploy:
  default_missing_user_fallback: "##DEPLOYER##"
api_definitions:
  types:
    group:
      add: { url: /api/v2/groups, method: post }
      modify: { url: "/api/v2/groups/{id}", method: put }
      remove: { url: "/api/v2/groups/{id}", method: delete }
      deploy_as_field: group
filters:
  removal_last_types: [group]
  order_instances:
    - parent_type: custom_object
      child_type: custom_object_field
      url: "/api/v2/custom_objects/{key}/fields/reorder"
"###;

    #[test]
    fn test_from_yaml() {
        let config = AdapterConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.adapter, "zendesk");
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.client.max_concurrent_requests, 10);
        assert!(matches!(config.client.auth, AuthConfig::Bearer { .. }));
        assert!(config.fetch.enable_missing_references);
        assert!(config.fetch.guide_enabled);
        assert!(!config.fetch.is_type_included("ticket"));
        assert!(config.fetch.is_type_included("group"));
        assert_eq!(
            config.deploy.default_missing_user_fallback.as_deref(),
            Some(DEPLOYER_FALLBACK_VALUE)
        );
        let group = config.api_definitions.get("group").unwrap();
        assert_eq!(group.id_field, "id");
        assert_eq!(group.remove.as_ref().unwrap().method, HttpMethod::Delete);
        assert_eq!(group.deploy_as_field.as_deref(), Some("group"));
        assert_eq!(config.filters.users_url, "/api/v2/users");
        assert_eq!(config.filters.order_instances[0].parent_key_field, "key");
        assert_eq!(
            config.filters.order_instances[0].order_type_name(),
            "custom_object_field_order"
        );
    }

    #[test]
    fn test_validation() {
        let bad_url = SAMPLE.replace("https://acme.zendesk.com", "acme");
        let err = AdapterConfig::from_yaml(&bad_url).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");

        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        assert!(config.validate().is_ok());
        config.client.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_without_filters_section() {
        let config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        assert_eq!(config.filters.users_url, "/api/v2/users");

        let minimal = "adapter: zendesk\nclient:\n  base_url: https://acme.zendesk.com\n";
        let config = AdapterConfig::from_yaml(minimal).unwrap();
        assert_eq!(config.filters.users_url, "/api/v2/users");
        assert!(config.filters.child_order.is_empty());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = AdapterConfig::from_yaml("adapter: [").unwrap_err();
        assert_eq!(err.error_code(), "YAML_ERROR");
    }

    #[test]
    fn test_crud_definition() {
        let def = TypeApiDefinition::crud("/api/v2/groups");
        assert_eq!(def.modify.unwrap().url, "/api/v2/groups/{id}");
        assert_eq!(def.add.unwrap().method, HttpMethod::Post);
    }
}
