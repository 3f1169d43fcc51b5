//! Access config reconciler - attaches or detaches the ephemeral external
//! address on the primary network interface.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Outcome, Reconciler};
use crate::compute::{AccessConfig, ComputeApi, Instance, resource_name};
use crate::error::{CpiError, Result};
use crate::operation::{OperationScope, OperationWaiter};

/// Desired external address state of the primary interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIp {
    /// An ephemeral one-to-one NAT address should be bound.
    pub ephemeral: bool,
    /// Address owned by a vip network. A bound access config carrying a
    /// different address is never detached automatically.
    pub vip: Option<String>,
}

pub struct AccessConfigReconciler {
    compute: Arc<dyn ComputeApi>,
    project: String,
    waiter: OperationWaiter,
}

impl AccessConfigReconciler {
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

    async fn add(&self, instance: &Instance, network_interface: &str) -> Result<()> {
        let zone = resource_name(&instance.zone);
        info!(instance = %instance.name, network_interface, "Adding access config");
        let operation = self
            .compute
            .add_access_config(
                &self.project,
                zone,
                &instance.name,
                network_interface,
                &AccessConfig::external_nat(),
            )
            .await
            .map_err(|e| {
                CpiError::api(
                    format!("Failed to add access config for instance '{}'", instance.name),
                    e,
                )
            })?;

        self.waiter
            .wait(operation, &OperationScope::Zone(zone.to_string()))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        instance: &Instance,
        network_interface: &str,
        access_config: &str,
    ) -> Result<()> {
        let zone = resource_name(&instance.zone);
        info!(
            instance = %instance.name,
            network_interface, access_config, "Deleting access config"
        );
        let operation = self
            .compute
            .delete_access_config(
                &self.project,
                zone,
                &instance.name,
                network_interface,
                access_config,
            )
            .await
            .map_err(|e| {
                CpiError::api(
                    format!("Failed to delete access config for instance '{}'", instance.name),
                    e,
                )
            })?;

        self.waiter
            .wait(operation, &OperationScope::Zone(zone.to_string()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for AccessConfigReconciler {
    type Desired = ExternalIp;

    async fn reconcile(&self, instance: &Instance, desired: &ExternalIp) -> Result<Outcome> {
        let nic = instance.primary_interface().ok_or_else(|| {
            CpiError::PreconditionFailed(format!(
                "instance '{}' has no network interface",
                instance.name
            ))
        })?;
        let bound = nic.access_configs.first();

        match (desired.ephemeral, bound) {
            (true, None) => {
                self.add(instance, &nic.name).await?;
                Ok(Outcome::Applied)
            }
            (false, Some(access_config)) => match &desired.vip {
                Some(vip) if *vip == access_config.nat_ip => {
                    debug!(
                        instance = %instance.name,
                        %vip,
                        "External address belongs to the vip network"
                    );
                    Ok(Outcome::Unchanged)
                }
                Some(vip) => Err(CpiError::not_supported(
                    &instance.name,
                    format!(
                        "external address '{}' is bound while vip '{}' is configured; \
                         it will not be detached in place",
                        access_config.nat_ip, vip
                    ),
                )),
                None => {
                    self.delete(instance, &nic.name, &access_config.name).await?;
                    Ok(Outcome::Applied)
                }
            },
            _ => {
                debug!(instance = %instance.name, "Access config unchanged");
                Ok(Outcome::Unchanged)
            }
        }
    }
}
