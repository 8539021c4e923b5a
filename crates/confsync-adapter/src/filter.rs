//! Filter interface
//!
//! A filter is a pluggable fetch/deploy transformation with up to four hooks.
//! Each filter declares the hooks it implements through [`Filter::phases`];
//! the pipeline only invokes declared hooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use confsync_elements::change::InstanceChange;
use confsync_elements::diagnostics::Diagnostic;
use confsync_elements::element::{Element, ElementSource};

use crate::client::ApiClient;
use crate::config::AdapterConfig;
use crate::error::AdapterResult;

/// Filter lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPhase {
    /// Normalize freshly fetched elements.
    OnFetch,
    /// Mutate changes before they are deployed.
    PreDeploy,
    /// Deploy the changes the filter claims.
    Deploy,
    /// Revert pre-deploy mutations on applied changes.
    OnDeploy,
}

impl FilterPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterPhase::OnFetch => "on_fetch",
            FilterPhase::PreDeploy => "pre_deploy",
            FilterPhase::Deploy => "deploy",
            FilterPhase::OnDeploy => "on_deploy",
        }
    }
}

impl fmt::Display for FilterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of deploying a set of changes.
#[derive(Debug, Clone, Default)]
pub struct DeployResult {
    pub applied_changes: Vec<InstanceChange>,
    pub errors: Vec<Diagnostic>,
}

impl DeployResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another result into this one, preserving order.
    pub fn extend(&mut self, other: DeployResult) {
        self.applied_changes.extend(other.applied_changes);
        self.errors.extend(other.errors);
    }
}

/// What a deploy hook hands back to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct FilterDeployOutput {
    pub deploy_result: DeployResult,
    /// Changes the filter did not claim, for later stages.
    pub leftover_changes: Vec<InstanceChange>,
}

impl FilterDeployOutput {
    /// Claim nothing.
    #[must_use]
    pub fn unclaimed(changes: Vec<InstanceChange>) -> Self {
        Self {
            deploy_result: DeployResult::default(),
            leftover_changes: changes,
        }
    }
}

/// Per-cycle configuration handed to every filter factory.
#[derive(Clone)]
pub struct FilterContext {
    pub config: Arc<AdapterConfig>,
    pub client: Arc<dyn ApiClient>,
    pub element_source: Arc<dyn ElementSource>,
}

impl FilterContext {
    pub fn new(
        config: Arc<AdapterConfig>,
        client: Arc<dyn ApiClient>,
        element_source: Arc<dyn ElementSource>,
    ) -> Self {
        Self {
            config,
            client,
            element_source,
        }
    }

    /// Adapter name used for element ids.
    pub fn adapter(&self) -> &str {
        &self.config.adapter
    }
}

impl fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterContext")
            .field("adapter", &self.config.adapter)
            .finish_non_exhaustive()
    }
}

/// A fetch/deploy transformation.
///
/// Hooks take `&mut self` so a filter can keep private state between the
/// hooks of one cycle. Hooks not listed in [`Filter::phases`] are never called.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Filter name, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Hooks this filter implements.
    fn phases(&self) -> &'static [FilterPhase];

    async fn on_fetch(&mut self, _elements: &mut Vec<Element>) -> AdapterResult<()> {
        Ok(())
    }

    async fn pre_deploy(&mut self, _changes: &mut Vec<InstanceChange>) -> AdapterResult<()> {
        Ok(())
    }

    async fn deploy(&mut self, changes: Vec<InstanceChange>) -> AdapterResult<FilterDeployOutput> {
        Ok(FilterDeployOutput::unclaimed(changes))
    }

    async fn on_deploy(&mut self, _changes: &mut Vec<InstanceChange>) -> AdapterResult<()> {
        Ok(())
    }
}

/// Factory building a filter from the cycle's context.
pub type FilterCreator = Arc<dyn Fn(&FilterContext) -> Box<dyn Filter> + Send + Sync>;

/// Wrap a closure as a [`FilterCreator`].
pub fn creator<F>(f: F) -> FilterCreator
where
    F: Fn(&FilterContext) -> Box<dyn Filter> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(FilterPhase::OnFetch.to_string(), "on_fetch");
        assert_eq!(FilterPhase::PreDeploy.as_str(), "pre_deploy");
        assert_eq!(
            serde_json::to_value(FilterPhase::OnDeploy).unwrap(),
            serde_json::json!("on_deploy")
        );
    }

    #[test]
    fn test_deploy_result_extend() {
        let mut result = DeployResult::new();
        let mut other = DeployResult::new();
        other.errors.push(Diagnostic::new(
            None,
            confsync_elements::diagnostics::Severity::Error,
            "x",
        ));
        result.extend(other);
        assert_eq!(result.errors.len(), 1);
        assert!(result.applied_changes.is_empty());
    }
}
