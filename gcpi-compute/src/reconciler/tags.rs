//! Tag reconciler - replaces the instance tag set when it differs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Outcome, Reconciler};
use crate::compute::{ComputeApi, Instance, Tags, resource_name};
use crate::error::{CpiError, Result};
use crate::operation::{OperationScope, OperationWaiter};

pub struct TagReconciler {
    compute: Arc<dyn ComputeApi>,
    project: String,
    waiter: OperationWaiter,
}

impl TagReconciler {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        project: impl Into<String>,
        waiter: OperationWaiter,
    ) -> Self {
        Self {
            compute,
            project: project.into(),
            waiter,
        }
    }
}

#[async_trait]
impl Reconciler for TagReconciler {
    type Desired = [String];

    async fn reconcile(&self, instance: &Instance, desired: &[String]) -> Result<Outcome> {
        let desired = canonical(desired);
        if desired == canonical(&instance.tags.items) {
            debug!(instance = %instance.name, "Tags unchanged");
            return Ok(Outcome::Unchanged);
        }

        // Full replace guarded by the fingerprint of this snapshot.
        let tags = Tags {
            fingerprint: instance.tags.fingerprint.clone(),
            items: desired,
        };
        let zone = resource_name(&instance.zone);

        info!(instance = %instance.name, tags = ?tags.items, "Setting instance tags");
        let operation = self
            .compute
            .set_tags(&self.project, zone, &instance.name, &tags)
            .await
            .map_err(|e| {
                CpiError::api(format!("Failed to set tags for instance '{}'", instance.name), e)
            })?;

        self.waiter
            .wait(operation, &OperationScope::Zone(zone.to_string()))
            .await?;
        Ok(Outcome::Applied)
    }
}

fn canonical(items: &[String]) -> Vec<String> {
    let mut items = items.to_vec();
    items.sort();
    items.dedup();
    items
}
