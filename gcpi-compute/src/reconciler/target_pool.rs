//! Target pool reconciler - attaches an instance to its load-balancing pool.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Outcome, Reconciler};
use crate::compute::{ComputeApi, Instance, resource_name};
use crate::error::{CpiError, Result};
use crate::locator::ResourceLocator;
use crate::operation::{OperationScope, OperationWaiter};

pub struct TargetPoolReconciler {
    compute: Arc<dyn ComputeApi>,
    project: String,
    locator: ResourceLocator,
    waiter: OperationWaiter,
}

impl TargetPoolReconciler {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        project: impl Into<String>,
        locator: ResourceLocator,
        waiter: OperationWaiter,
    ) -> Self {
        Self {
            compute,
            project: project.into(),
            locator,
            waiter,
        }
    }
}

#[async_trait]
impl Reconciler for TargetPoolReconciler {
    type Desired = Option<String>;

    async fn reconcile(&self, instance: &Instance, desired: &Option<String>) -> Result<Outcome> {
        let Some(pool_name) = desired.as_deref().filter(|name| !name.is_empty()) else {
            return Ok(Outcome::Unchanged);
        };

        let pool = self
            .locator
            .find_target_pool(pool_name, "")
            .await?
            .ok_or_else(|| CpiError::TargetPoolNotFound(pool_name.to_string()))?;

        if pool.instances.iter().any(|link| *link == instance.self_link) {
            debug!(
                instance = %instance.name,
                target_pool = pool_name,
                "Already attached to target pool"
            );
            return Ok(Outcome::Unchanged);
        }

        let region = resource_name(&pool.region);
        info!(
            instance = %instance.name,
            target_pool = pool_name,
            region,
            "Attaching instance to target pool"
        );
        let operation = self
            .compute
            .add_instance_to_target_pool(&self.project, region, &pool.name, &instance.self_link)
            .await
            .map_err(|e| {
                CpiError::api(
                    format!(
                        "Failed to add instance '{}' to target pool '{}'",
                        instance.name, pool_name
                    ),
                    e,
                )
            })?;

        self.waiter
            .wait(operation, &OperationScope::Region(region.to_string()))
            .await?;
        Ok(Outcome::Applied)
    }
}
