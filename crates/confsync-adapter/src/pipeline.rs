//! Filter pipeline orchestrator
//!
//! Runs an ordered filter list over one fetch or one deploy cycle. Filter order
//! is fixed at construction. A failing hook is converted into diagnostics and
//! the state it was mutating is restored, so later filters see the state as
//! the previous successful filter left it.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use confsync_elements::change::InstanceChange;
use confsync_elements::diagnostics::{Diagnostic, Severity};
use confsync_elements::element::Element;

use crate::deployment::{deploy_changes, ApiChangeDeployer, ChangeHandler};
use crate::error::AdapterError;
use crate::filter::{DeployResult, Filter, FilterContext, FilterCreator, FilterPhase};

/// Outcome of a fetch normalization run.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub elements: Vec<Element>,
    pub errors: Vec<Diagnostic>,
}

/// One cycle's filter instances plus the default deploy path.
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
    default_deployer: Arc<dyn ChangeHandler>,
    max_concurrency: usize,
}

impl FilterPipeline {
    /// Instantiate every creator, in order, against the cycle's context.
    ///
    /// Leftover changes go to an [`ApiChangeDeployer`] built from the context.
    pub fn new(ctx: &FilterContext, creators: &[FilterCreator]) -> Self {
        let filters: Vec<Box<dyn Filter>> = creators.iter().map(|create| create(ctx)).collect();
        debug!(
            adapter = %ctx.adapter(),
            filters = ?filters.iter().map(|f| f.name().to_string()).collect::<Vec<_>>(),
            "Built filter pipeline"
        );
        Self {
            filters,
            default_deployer: Arc::new(ApiChangeDeployer::from_context(ctx)),
            max_concurrency: ctx.config.client.max_concurrent_requests,
        }
    }

    /// Replace the handler used for changes no filter claimed.
    #[must_use]
    pub fn with_default_deployer(mut self, deployer: Arc<dyn ChangeHandler>) -> Self {
        self.default_deployer = deployer;
        self
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    fn hook_failure(filter: &dyn Filter, phase: FilterPhase, error: &AdapterError) -> String {
        AdapterError::filter_hook(filter.name(), phase, error.to_string()).to_string()
    }

    /// Run every `on_fetch` hook over the shared element collection.
    ///
    /// A failing hook yields a warning and its partial mutations are discarded.
    #[instrument(skip(self, elements), fields(count = elements.len()))]
    pub async fn on_fetch(&mut self, mut elements: Vec<Element>) -> FetchResult {
        let mut errors = Vec::new();
        for filter in &mut self.filters {
            if !filter.phases().contains(&FilterPhase::OnFetch) {
                continue;
            }
            let snapshot = elements.clone();
            if let Err(e) = filter.on_fetch(&mut elements).await {
                let message = Self::hook_failure(&**filter, FilterPhase::OnFetch, &e);
                warn!(filter = %filter.name(), error = %e, "Fetch hook failed");
                elements = snapshot;
                errors.push(Diagnostic::new(None, Severity::Warning, message));
            }
        }
        FetchResult { elements, errors }
    }

    /// Run a mutating change hook of every filter declaring `phase`.
    async fn run_change_hooks(
        &mut self,
        phase: FilterPhase,
        changes: &mut Vec<InstanceChange>,
        errors: &mut Vec<Diagnostic>,
    ) {
        for filter in &mut self.filters {
            if !filter.phases().contains(&phase) {
                continue;
            }
            let snapshot = changes.clone();
            let outcome = match phase {
                FilterPhase::PreDeploy => filter.pre_deploy(changes).await,
                FilterPhase::OnDeploy => filter.on_deploy(changes).await,
                FilterPhase::OnFetch | FilterPhase::Deploy => Ok(()),
            };
            if let Err(e) = outcome {
                let message = Self::hook_failure(&**filter, phase, &e);
                warn!(filter = %filter.name(), phase = %phase, error = %e, "Change hook failed");
                *changes = snapshot;
                errors.push(Diagnostic::new(None, Severity::Error, message));
            }
        }
    }

    /// Deploy a change batch through pre-deploy, the deploy chain, the
    /// default deployer and on-deploy, in that order.
    ///
    /// When a deploy hook fails, every change it was handed is reported and
    /// dropped from the rest of the chain.
    #[instrument(skip(self, changes), fields(count = changes.len()))]
    pub async fn deploy(&mut self, mut changes: Vec<InstanceChange>) -> DeployResult {
        let mut result = DeployResult::new();

        self.run_change_hooks(FilterPhase::PreDeploy, &mut changes, &mut result.errors)
            .await;

        let mut leftover = changes;
        for filter in &mut self.filters {
            if leftover.is_empty() {
                break;
            }
            if !filter.phases().contains(&FilterPhase::Deploy) {
                continue;
            }
            let handed: Vec<_> = leftover.iter().map(|c| c.elem_id().clone()).collect();
            match filter.deploy(std::mem::take(&mut leftover)).await {
                Ok(output) => {
                    debug!(
                        filter = %filter.name(),
                        applied = output.deploy_result.applied_changes.len(),
                        errors = output.deploy_result.errors.len(),
                        leftover = output.leftover_changes.len(),
                        "Filter deploy finished"
                    );
                    result.extend(output.deploy_result);
                    leftover = output.leftover_changes;
                }
                Err(e) => {
                    let message = Self::hook_failure(&**filter, FilterPhase::Deploy, &e);
                    warn!(filter = %filter.name(), error = %e, "Deploy hook failed");
                    result
                        .errors
                        .extend(handed.iter().map(|id| Diagnostic::error(id, message.clone())));
                }
            }
        }

        if !leftover.is_empty() {
            let deployer = self.default_deployer.as_ref();
            result.extend(deploy_changes(leftover, deployer, self.max_concurrency).await);
        }

        self.run_change_hooks(
            FilterPhase::OnDeploy,
            &mut result.applied_changes,
            &mut result.errors,
        )
        .await;

        info!(
            applied = result.applied_changes.len(),
            errors = result.errors.len(),
            "Deploy cycle finished"
        );
        result
    }
}
