//! Deploy removals after every other change of the same type.
//!
//! Removing a default record before its replacement is promoted leaves the
//! remote account in an invalid state, so removals wait for the rest.

use async_trait::async_trait;

use confsync_elements::change::InstanceChange;

use crate::deployment::{deploy_removals_last, partition_changes, ApiChangeDeployer};
use crate::error::AdapterResult;
use crate::filter::{Filter, FilterContext, FilterDeployOutput, FilterPhase};

pub struct RemovalLastFilter {
    types: Vec<String>,
    deployer: ApiChangeDeployer,
    max_concurrency: usize,
}

impl RemovalLastFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            types: ctx.config.filters.removal_last_types.clone(),
            deployer: ApiChangeDeployer::from_context(ctx),
            max_concurrency: ctx.config.client.max_concurrent_requests,
        }
    }
}

#[async_trait]
impl Filter for RemovalLastFilter {
    fn name(&self) -> &str {
        "removal_last"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::Deploy]
    }

    async fn deploy(&mut self, changes: Vec<InstanceChange>) -> AdapterResult<FilterDeployOutput> {
        let (relevant, leftover_changes) = partition_changes(changes, |change| {
            self.types.iter().any(|t| t == change.data().type_name())
        });
        let deploy_result =
            deploy_removals_last(relevant, &self.deployer, self.max_concurrency).await;
        Ok(FilterDeployOutput {
            deploy_result,
            leftover_changes,
        })
    }
}
