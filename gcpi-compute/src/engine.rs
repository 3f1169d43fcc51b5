//! Network reconciliation engine.
//!
//! Sequences the attribute reconcilers against one instance and decides
//! whether a desired configuration can be applied in place at all. Steps run
//! strictly one after another; a failing step aborts the rest and nothing is
//! rolled back, since every step is idempotent and a retry converges.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::compute::{ComputeApi, Instance, resource_name};
use crate::error::{CpiError, Result};
use crate::locator::ResourceLocator;
use crate::metadata;
use crate::network_config::DesiredNetworkConfig;
use crate::operation::{OperationScope, OperationWaiter, WaiterConfig};
use crate::reconciler::{
    AccessConfigReconciler, Outcome, Reconciler, TagReconciler, TargetPoolReconciler,
};

pub struct NetworkEngine {
    compute: Arc<dyn ComputeApi>,
    project: String,
    locator: ResourceLocator,
    waiter: OperationWaiter,
    access_configs: AccessConfigReconciler,
    tags: TagReconciler,
    target_pools: TargetPoolReconciler,
    default_zone: Option<String>,
}

impl NetworkEngine {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        project: impl Into<String>,
        config: WaiterConfig,
    ) -> Self {
        let project = project.into();
        let locator = ResourceLocator::new(compute.clone(), project.clone());
        let waiter = OperationWaiter::new(compute.clone(), project.clone(), config);

        Self {
            access_configs: AccessConfigReconciler::new(
                compute.clone(),
                project.clone(),
                waiter.clone(),
            ),
            tags: TagReconciler::new(compute.clone(), project.clone(), waiter.clone()),
            target_pools: TargetPoolReconciler::new(
                compute.clone(),
                project.clone(),
                locator.clone(),
                waiter.clone(),
            ),
            compute,
            project,
            locator,
            waiter,
            default_zone: None,
        }
    }

    /// Instances are looked up in `zone` first; the aggregated search is the
    /// fallback when they are not there.
    pub fn with_default_zone(mut self, zone: impl Into<String>) -> Self {
        self.default_zone = Some(zone.into()).filter(|z| !z.is_empty());
        self
    }

    /// First-attach path: only the target pool membership is reconciled.
    pub async fn configure_networks(&self, id: &str, desired: &DesiredNetworkConfig) -> Result<()> {
        let instance = self.locate(id, "").await?;
        self.target_pools
            .reconcile(&instance, &desired.target_pool)
            .await?;
        Ok(())
    }

    /// Brings the instance's network attachment in line with `desired`.
    ///
    /// A different network or IP forwarding setting cannot be changed in
    /// place and fails with [`CpiError::NotSupported`] before anything is
    /// mutated.
    pub async fn update_networks(&self, id: &str, desired: &DesiredNetworkConfig) -> Result<()> {
        let mut instance = self.locate(id, "").await?;
        info!(instance = %instance.name, "Updating networks");

        check_network(&instance, desired)?;
        check_ip_forwarding(&instance, desired)?;

        let outcome = self
            .access_configs
            .reconcile(&instance, &desired.external_ip())
            .await?;
        if outcome == Outcome::Applied {
            // Later steps write with fingerprints from a fresh read.
            instance = self.locate(&instance.name, &instance.zone).await?;
        }

        self.tags.reconcile(&instance, &desired.tags).await?;

        self.configure_networks(id, desired).await
    }

    /// Merges `desired` into the instance metadata with one fingerprinted
    /// write. Returns [`Outcome::Unchanged`] when every key already holds the
    /// desired value.
    pub async fn set_metadata(
        &self,
        id: &str,
        desired: &BTreeMap<String, String>,
    ) -> Result<Outcome> {
        let instance = self.locate(id, "").await?;
        let merged = metadata::merge(&instance.metadata, desired);
        if metadata::same_items(&merged, &instance.metadata) {
            debug!(instance = %instance.name, "Metadata unchanged");
            return Ok(Outcome::Unchanged);
        }

        let zone = resource_name(&instance.zone);
        info!(instance = %instance.name, keys = desired.len(), "Setting instance metadata");
        let operation = self
            .compute
            .set_metadata(&self.project, zone, &instance.name, &merged)
            .await
            .map_err(|e| {
                CpiError::api(format!("Failed to set metadata for instance '{}'", id), e)
            })?;

        self.waiter
            .wait(operation, &OperationScope::Zone(zone.to_string()))
            .await?;
        Ok(Outcome::Applied)
    }

    async fn locate(&self, id: &str, zone: &str) -> Result<Instance> {
        let mut found = None;
        if zone.is_empty() {
            if let Some(default_zone) = &self.default_zone {
                found = self.locator.find_instance(id, default_zone).await?;
            }
        }
        if found.is_none() {
            found = self.locator.find_instance(id, zone).await?;
        }
        found.ok_or_else(|| CpiError::PreconditionFailed(format!("instance '{}' not found", id)))
    }
}

fn check_network(instance: &Instance, desired: &DesiredNetworkConfig) -> Result<()> {
    let nic = instance.primary_interface().ok_or_else(|| {
        CpiError::PreconditionFailed(format!(
            "instance '{}' has no network interface",
            instance.name
        ))
    })?;

    let current = resource_name(&nic.network);
    let wanted = resource_name(&desired.network_name);
    if current != wanted {
        return Err(CpiError::not_supported(
            &instance.name,
            format!("network changed from '{}' to '{}'", current, wanted),
        ));
    }
    Ok(())
}

fn check_ip_forwarding(instance: &Instance, desired: &DesiredNetworkConfig) -> Result<()> {
    if instance.can_ip_forward != desired.ip_forwarding {
        return Err(CpiError::not_supported(
            &instance.name,
            format!(
                "ip forwarding changed from {} to {}",
                instance.can_ip_forward, desired.ip_forwarding
            ),
        ));
    }
    Ok(())
}
