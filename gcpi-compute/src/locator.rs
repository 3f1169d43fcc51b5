//! Resource locator - scoped or aggregated lookups where absence is not an
//! error.

use std::sync::Arc;

use tracing::debug;

use crate::compute::{ApiError, ApiResult, ComputeApi, Instance, TargetPool, resource_name};
use crate::error::{CpiError, Result};

/// Finds instances and target pools by name.
///
/// An empty scope searches every zone or region through the aggregated
/// listing; a non-empty scope issues a direct get. `Ok(None)` means the
/// resource does not exist.
#[derive(Clone)]
pub struct ResourceLocator {
    compute: Arc<dyn ComputeApi>,
    project: String,
}

impl ResourceLocator {
    pub fn new(compute: Arc<dyn ComputeApi>, project: impl Into<String>) -> Self {
        Self {
            compute,
            project: project.into(),
        }
    }

    pub async fn find_instance(&self, id: &str, zone: &str) -> Result<Option<Instance>> {
        if zone.is_empty() {
            debug!(instance = id, "Finding instance in all zones");
            let instances = self
                .compute
                .list_instances_aggregated(&self.project, id)
                .await
                .map_err(|e| CpiError::api(format!("Failed to find instance '{}'", id), e))?;
            return Ok(instances.into_iter().find(|i| i.name == id));
        }

        let zone = resource_name(zone);
        debug!(instance = id, zone, "Finding instance");
        found(
            self.compute.get_instance(&self.project, zone, id).await,
            || format!("Failed to find instance '{}' in zone '{}'", id, zone),
        )
    }

    pub async fn find_target_pool(&self, name: &str, region: &str) -> Result<Option<TargetPool>> {
        if region.is_empty() {
            debug!(target_pool = name, "Finding target pool in all regions");
            let pools = self
                .compute
                .list_target_pools_aggregated(&self.project, name)
                .await
                .map_err(|e| CpiError::api(format!("Failed to find target pool '{}'", name), e))?;
            return Ok(pools.into_iter().find(|p| p.name == name));
        }

        let region = resource_name(region);
        debug!(target_pool = name, region, "Finding target pool");
        found(
            self.compute.get_target_pool(&self.project, region, name).await,
            || format!("Failed to find target pool '{}' in region '{}'", name, region),
        )
    }
}

/// Maps a direct get onto the found/not-found contract.
fn found<T>(result: ApiResult<T>, context: impl FnOnce() -> String) -> Result<Option<T>> {
    match result {
        Ok(resource) => Ok(Some(resource)),
        Err(ApiError::NotFound) => Ok(None),
        Err(source) => Err(CpiError::api(context(), source)),
    }
}
