//! Change validators
//!
//! Validators inspect a change batch before deployment and report
//! element-scoped diagnostics. Changes that receive an `Error` diagnostic are
//! withheld from the deploy pipeline.

use async_trait::async_trait;
use tracing::{debug, error};

use confsync_elements::change::{Change, InstanceChange};
use confsync_elements::diagnostics::Diagnostic;
use confsync_elements::diff::detailed_compare_instances;
use confsync_elements::element::{ElementSource, InstanceElement};
use confsync_elements::ids::ElemId;
use confsync_elements::value::Value;

use crate::config::{ActionMatch, FeatureGateRule, StatusRemovalRule, ValidatorSettings};

/// Trait for pluggable change validators.
#[async_trait]
pub trait ChangeValidator: Send + Sync {
    /// Validator name, used in logs.
    fn name(&self) -> &str;

    /// Validate a change batch against the stored element state.
    async fn validate(
        &self,
        changes: &[InstanceChange],
        element_source: &dyn ElementSource,
    ) -> Vec<Diagnostic>;
}

// ============================================================================
// Built-in Validators
// ============================================================================

/// Rejects removal of the instance flagged `default: true` of protected types.
#[derive(Debug, Default)]
pub struct DefaultRemovalValidator {
    types: Vec<String>,
}

impl DefaultRemovalValidator {
    pub fn new(types: Vec<String>) -> Self {
        Self { types }
    }
}

#[async_trait]
impl ChangeValidator for DefaultRemovalValidator {
    fn name(&self) -> &str {
        "default_removal"
    }

    async fn validate(
        &self,
        changes: &[InstanceChange],
        _element_source: &dyn ElementSource,
    ) -> Vec<Diagnostic> {
        changes
            .iter()
            .filter(|change| change.is_removal())
            .map(Change::data)
            .filter(|instance| self.types.iter().any(|t| t == instance.type_name()))
            .filter(|instance| instance.get("default").and_then(Value::as_bool) == Some(true))
            .map(|instance| {
                let label = instance
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_else(|| instance.elem_id.name());
                Diagnostic::error(
                    &instance.elem_id,
                    format!("Default {} cannot be deleted", instance.type_name()),
                )
                .with_detailed_message(format!(
                    "{} {label} is marked as default and therefore cannot be deleted",
                    instance.type_name()
                ))
            })
            .collect()
    }
}

/// Guards instances installed by an external app.
#[derive(Debug, Default)]
pub struct ExternalSourceValidator {
    types: Vec<String>,
}

const EXTERNAL_SOURCE_FIELD: &str = "external_source";
const SIGNING_SECRET_FIELD: &str = "signing_secret";

impl ExternalSourceValidator {
    pub fn new(types: Vec<String>) -> Self {
        Self { types }
    }

    fn app_name(instance: &InstanceElement) -> String {
        instance
            .get(EXTERNAL_SOURCE_FIELD)
            .and_then(|source| source.get_path(&["data", "installation_id"]))
            .and_then(Value::as_reference)
            .map(|reference| format!(" '{}'", reference.elem_id.name()))
            .unwrap_or_default()
    }

    fn validate_modification(before: &InstanceElement, after: &InstanceElement) -> Vec<Diagnostic> {
        let details = detailed_compare_instances(before, after);
        let touches_locked_field = details.iter().any(|detail| {
            detail
                .path()
                .iter()
                .any(|part| part == EXTERNAL_SOURCE_FIELD || part == SIGNING_SECRET_FIELD)
        });
        if touches_locked_field {
            return vec![Diagnostic::error(&after.elem_id, "Illegal modification")
                .with_detailed_message(format!(
                    "Cannot modify '{EXTERNAL_SOURCE_FIELD}' or '{SIGNING_SECRET_FIELD}' fields of a {}",
                    after.type_name()
                ))];
        }

        let deactivated = details.iter().any(|detail| {
            detail.id.name() == "status"
                && matches!(
                    &detail.change,
                    Change::Modification { before, after }
                        if before.as_str() == Some("active") && after.as_str() == Some("inactive")
                )
        });
        let mut diagnostics = Vec::new();
        if deactivated {
            diagnostics.push(
                Diagnostic::warning(
                    &after.elem_id,
                    "Deactivation of an instance that was installed by an external app",
                )
                .with_detailed_message(
                    "If you deactivate this instance, the app that created it might not work as intended. You'll need to reactivate it to use it again.",
                ),
            );
        }
        if !deactivated || details.len() > 1 {
            diagnostics.push(
                Diagnostic::warning(
                    &after.elem_id,
                    "Change of an instance that was installed by an external app",
                )
                .with_detailed_message(
                    "If you edit this instance, the app that created it might not work as intended.",
                ),
            );
        }
        diagnostics
    }
}

#[async_trait]
impl ChangeValidator for ExternalSourceValidator {
    fn name(&self) -> &str {
        "external_source"
    }

    async fn validate(
        &self,
        changes: &[InstanceChange],
        _element_source: &dyn ElementSource,
    ) -> Vec<Diagnostic> {
        let relevant = changes.iter().filter(|change| {
            let instance = change.data();
            self.types.iter().any(|t| t == instance.type_name())
                && instance.get(EXTERNAL_SOURCE_FIELD).is_some_and(|v| !v.is_null())
        });

        let mut diagnostics = Vec::new();
        for change in relevant {
            match change {
                Change::Addition { after } => diagnostics.push(
                    Diagnostic::error(
                        &after.elem_id,
                        "Installation of an instance that was installed by an external app",
                    )
                    .with_detailed_message(format!(
                        "This {} was installed by the external app{}. In order to add it, please install that app.",
                        after.type_name(),
                        Self::app_name(after)
                    )),
                ),
                Change::Removal { before } => diagnostics.push(
                    Diagnostic::error(
                        &before.elem_id,
                        "Removal of an instance that was installed by an external app",
                    )
                    .with_detailed_message(format!(
                        "This {} was installed by the external app{}. In order to remove it, please uninstall that app.",
                        before.type_name(),
                        Self::app_name(before)
                    )),
                ),
                Change::Modification { before, after } => {
                    diagnostics.extend(Self::validate_modification(before, after));
                }
            }
        }
        diagnostics
    }
}

/// Rejects changes of a gated type while its feature flag is off.
///
/// With an action match only additions and modifications holding a matching
/// action are gated. When the flag cannot be read the validator logs and passes.
#[derive(Debug)]
pub struct FeatureGateValidator {
    adapter: String,
    rule: FeatureGateRule,
}

impl FeatureGateValidator {
    pub fn new(adapter: impl Into<String>, rule: FeatureGateRule) -> Self {
        Self {
            adapter: adapter.into(),
            rule,
        }
    }

    fn has_action(instance: &InstanceElement, action: &ActionMatch) -> bool {
        let matches = |item: &Value| {
            item.get("field").and_then(Value::as_str) == Some(action.value.as_str())
        };
        instance
            .get(&action.list_field)
            .and_then(Value::as_list)
            .is_some_and(|actions| actions.iter().any(matches))
    }

    fn is_gated(&self, change: &InstanceChange) -> bool {
        let instance = change.data();
        if instance.type_name() != self.rule.type_name {
            return false;
        }
        match &self.rule.action {
            Some(action) => !change.is_removal() && Self::has_action(instance, action),
            None => true,
        }
    }

    fn diagnostic(&self, instance: &InstanceElement) -> Diagnostic {
        match &self.rule.action {
            Some(action) => Diagnostic::error(
                &instance.elem_id,
                "Cannot change this element since one of its action types is not supported",
            )
            .with_detailed_message(format!(
                "Action field '{}' is not supported, please turn on {} in your account settings",
                action.value, self.rule.setting_path
            )),
            None => Diagnostic::error(
                &instance.elem_id,
                format!("{} is not enabled.", self.rule.type_name),
            )
            .with_detailed_message(format!(
                "Cannot deploy {} when it is not enabled in the account.",
                self.rule.type_name
            )),
        }
    }

    async fn is_enabled(&self, element_source: &dyn ElementSource) -> bool {
        let settings_id =
            ElemId::config_instance_id(self.adapter.as_str(), self.rule.settings_type.as_str());
        let fail = |reason: &str| {
            error!(
                type_name = %self.rule.type_name,
                reason,
                "Failed to check feature gate, skipping validation"
            );
            true
        };

        let Some(element) = element_source.get(&settings_id).await else {
            return fail("settings instance not found");
        };
        let Some(settings) = element.as_instance() else {
            return fail("settings element is not an instance");
        };
        let path: Vec<&str> = self.rule.setting_path.split('.').collect();
        let flag = match path.split_first() {
            Some((first, rest)) => settings
                .get(first)
                .and_then(|v| if rest.is_empty() { Some(v) } else { v.get_path(rest) }),
            None => None,
        };
        match flag.and_then(Value::as_bool) {
            Some(enabled) => enabled,
            None => fail("setting is missing or not a boolean"),
        }
    }
}

#[async_trait]
impl ChangeValidator for FeatureGateValidator {
    fn name(&self) -> &str {
        "feature_gate"
    }

    async fn validate(
        &self,
        changes: &[InstanceChange],
        element_source: &dyn ElementSource,
    ) -> Vec<Diagnostic> {
        let gated: Vec<&InstanceElement> = changes
            .iter()
            .filter(|change| self.is_gated(change))
            .map(Change::data)
            .collect();
        if gated.is_empty() || self.is_enabled(element_source).await {
            return Vec::new();
        }
        debug!(type_name = %self.rule.type_name, count = gated.len(), "Feature disabled");
        gated
            .into_iter()
            .map(|instance| self.diagnostic(instance))
            .collect()
    }
}

/// Rejects removal of instances that are not in their removable status.
#[derive(Debug, Default)]
pub struct StatusRemovalValidator {
    rules: Vec<StatusRemovalRule>,
}

impl StatusRemovalValidator {
    pub fn new(rules: Vec<StatusRemovalRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ChangeValidator for StatusRemovalValidator {
    fn name(&self) -> &str {
        "status_removal"
    }

    async fn validate(
        &self,
        changes: &[InstanceChange],
        _element_source: &dyn ElementSource,
    ) -> Vec<Diagnostic> {
        changes
            .iter()
            .filter(|change| change.is_removal())
            .map(Change::data)
            .filter_map(|instance| {
                let rule = self.rules.iter().find(|r| r.type_name == instance.type_name())?;
                let status = instance.get(&rule.status_field).and_then(Value::as_str);
                if status == Some(rule.removable_status.as_str()) {
                    return None;
                }
                Some(
                    Diagnostic::error(
                        &instance.elem_id,
                        format!(
                            "Cannot delete {} that is not in '{}' status",
                            rule.type_name, rule.removable_status
                        ),
                    )
                    .with_detailed_message(format!(
                        "Cannot delete {} that is not in '{}' state. Name: {}, status: {}",
                        rule.type_name,
                        rule.removable_status,
                        instance.elem_id,
                        status.unwrap_or("unknown")
                    )),
                )
            })
            .collect()
    }
}

/// Build the validators described by the settings table.
pub fn default_validators(
    adapter: &str,
    settings: &ValidatorSettings,
) -> Vec<Box<dyn ChangeValidator>> {
    let mut validators: Vec<Box<dyn ChangeValidator>> = Vec::new();
    if !settings.default_protected_types.is_empty() {
        validators.push(Box::new(DefaultRemovalValidator::new(
            settings.default_protected_types.clone(),
        )));
    }
    if !settings.external_source_types.is_empty() {
        validators.push(Box::new(ExternalSourceValidator::new(
            settings.external_source_types.clone(),
        )));
    }
    for rule in &settings.feature_gates {
        validators.push(Box::new(FeatureGateValidator::new(adapter, rule.clone())));
    }
    if !settings.status_removals.is_empty() {
        validators.push(Box::new(StatusRemovalValidator::new(
            settings.status_removals.clone(),
        )));
    }
    validators
}
