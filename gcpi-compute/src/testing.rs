//! In-memory Compute Engine double for unit tests.
//!
//! Records every mutating call in order, enforces fingerprint
//! compare-and-swap on tags and metadata, and lets tests inject pending
//! polls, failed polls, remote operation errors and concurrent writers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::compute::{
    AccessConfig, ApiError, ApiResult, ComputeApi, Instance, Metadata, NetworkInterface,
    Operation, OperationError, OperationErrors, OperationStatus, Tags, TargetPool, resource_name,
};
use crate::operation::OperationScope;

pub const PROJECT: &str = "proj";
pub const ZONE: &str = "us-central1-a";
pub const REGION: &str = "us-central1";
pub const ASSIGNED_NAT_IP: &str = "203.0.113.10";

/// A mutating call as issued against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetTags {
        instance: String,
        tags: Tags,
    },
    SetMetadata {
        instance: String,
        metadata: Metadata,
    },
    AddAccessConfig {
        instance: String,
        network_interface: String,
        access_config: AccessConfig,
    },
    DeleteAccessConfig {
        instance: String,
        network_interface: String,
        access_config: String,
    },
    AddInstanceToTargetPool {
        target_pool: String,
        instance: String,
    },
}

struct PendingOperation {
    operation: Operation,
    remaining_polls: usize,
    error: Option<String>,
}

#[derive(Default)]
struct State {
    instances: BTreeMap<String, Instance>,
    target_pools: BTreeMap<String, TargetPool>,
    operations: HashMap<String, PendingOperation>,
    calls: Vec<Call>,
    next_id: u64,
    pending_polls: usize,
    failing_polls: usize,
    operation_error: Option<String>,
    concurrent_tag_writer: bool,
    operation_polls: usize,
    instance_reads: usize,
}

impl State {
    fn next_fingerprint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Registers an operation for a mutation. Returns the handle and whether
    /// the mutation should be applied.
    fn mutation(&mut self, target: &str, scope: &OperationScope) -> (Operation, bool) {
        self.next_id += 1;
        let name = format!("operation-{}", self.next_id);
        let (zone, region) = match scope {
            OperationScope::Zone(z) => (z.clone(), String::new()),
            OperationScope::Region(r) => (String::new(), r.clone()),
            OperationScope::Global => (String::new(), String::new()),
        };
        let error = self.operation_error.clone();
        // Without pending polls the mutation finishes synchronously.
        let (status, payload) = if self.pending_polls == 0 {
            (OperationStatus::Done, error.as_deref().map(error_payload))
        } else {
            (OperationStatus::Pending, None)
        };
        let operation = Operation {
            name: name.clone(),
            status,
            target_link: target.to_string(),
            zone,
            region,
            error: payload,
            ..Default::default()
        };
        let apply = error.is_none();
        self.operations.insert(
            name,
            PendingOperation {
                operation: operation.clone(),
                remaining_polls: self.pending_polls,
                error,
            },
        );
        (operation, apply)
    }

    fn instance_mut(&mut self, zone: &str, name: &str) -> ApiResult<&mut Instance> {
        self.instances
            .get_mut(name)
            .filter(|i| resource_name(&i.zone) == zone)
            .ok_or(ApiError::NotFound)
    }
}

#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<State>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, instance: Instance) -> Self {
        self.put_instance(instance);
        self
    }

    pub fn with_target_pool(self, pool: TargetPool) -> Self {
        self.state
            .lock()
            .unwrap()
            .target_pools
            .insert(pool.name.clone(), pool);
        self
    }

    pub fn put_instance(&self, instance: Instance) {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(instance.name.clone(), instance);
    }

    pub fn instance(&self, name: &str) -> Instance {
        self.state.lock().unwrap().instances[name].clone()
    }

    pub fn target_pool(&self, name: &str) -> TargetPool {
        self.state.lock().unwrap().target_pools[name].clone()
    }

    /// Every mutation from now on needs `polls` non-terminal polls.
    pub fn set_pending_polls(&self, polls: usize) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    /// The next `count` operation polls fail with a transport error.
    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().unwrap().failing_polls = count;
    }

    /// Every mutation from now on finishes with this error payload.
    pub fn fail_operations(&self, error: &str) {
        self.state.lock().unwrap().operation_error = Some(error.to_string());
    }

    /// After every instance read another writer replaces the tags, leaving
    /// the reader with a stale fingerprint.
    pub fn race_tag_writes(&self) {
        self.state.lock().unwrap().concurrent_tag_writer = true;
    }

    /// Registers a bare pending operation.
    pub fn start_operation(&self, name: &str, polls: usize, error: Option<&str>) -> Operation {
        let operation = Operation {
            name: name.to_string(),
            status: OperationStatus::Pending,
            zone: ZONE.to_string(),
            ..Default::default()
        };
        self.state.lock().unwrap().operations.insert(
            name.to_string(),
            PendingOperation {
                operation: operation.clone(),
                remaining_polls: polls,
                error: error.map(str::to_string),
            },
        );
        operation
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn operation_polls(&self) -> usize {
        self.state.lock().unwrap().operation_polls
    }

    pub fn instance_reads(&self) -> usize {
        self.state.lock().unwrap().instance_reads
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn get_instance(&self, _project: &str, zone: &str, name: &str) -> ApiResult<Instance> {
        let mut state = self.state.lock().unwrap();
        state.instance_reads += 1;
        let snapshot = state.instance_mut(zone, name)?.clone();

        if state.concurrent_tag_writer {
            let fingerprint = state.next_fingerprint("tags");
            let instance = state.instance_mut(zone, name)?;
            instance.tags.fingerprint = fingerprint;
        }
        Ok(snapshot)
    }

    async fn list_instances_aggregated(
        &self,
        _project: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<Instance>> {
        let mut state = self.state.lock().unwrap();
        state.instance_reads += 1;
        let found: Vec<Instance> = state
            .instances
            .values()
            .filter(|i| i.name.ends_with(name_filter))
            .cloned()
            .collect();

        if state.concurrent_tag_writer {
            for instance in &found {
                let fingerprint = state.next_fingerprint("tags");
                if let Some(live) = state.instances.get_mut(&instance.name) {
                    live.tags.fingerprint = fingerprint;
                }
            }
        }
        Ok(found)
    }

    async fn set_tags(
        &self,
        _project: &str,
        zone: &str,
        name: &str,
        tags: &Tags,
    ) -> ApiResult<Operation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetTags {
            instance: name.to_string(),
            tags: tags.clone(),
        });

        let live = state.instance_mut(zone, name)?.tags.fingerprint.clone();
        if live != tags.fingerprint {
            return Err(ApiError::Status {
                code: 412,
                message: "Supplied fingerprint does not match current tags fingerprint".into(),
            });
        }

        let (operation, apply) = state.mutation(name, &OperationScope::Zone(zone.to_string()));
        if apply {
            let fingerprint = state.next_fingerprint("tags");
            let instance = state.instance_mut(zone, name)?;
            instance.tags = Tags {
                fingerprint,
                items: tags.items.clone(),
            };
        }
        Ok(operation)
    }

    async fn set_metadata(
        &self,
        _project: &str,
        zone: &str,
        name: &str,
        metadata: &Metadata,
    ) -> ApiResult<Operation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetMetadata {
            instance: name.to_string(),
            metadata: metadata.clone(),
        });

        let live = state.instance_mut(zone, name)?.metadata.fingerprint.clone();
        if live != metadata.fingerprint {
            return Err(ApiError::Status {
                code: 412,
                message: "Supplied fingerprint does not match current metadata fingerprint".into(),
            });
        }

        let (operation, apply) = state.mutation(name, &OperationScope::Zone(zone.to_string()));
        if apply {
            let fingerprint = state.next_fingerprint("metadata");
            let instance = state.instance_mut(zone, name)?;
            instance.metadata = Metadata {
                fingerprint,
                items: metadata.items.clone(),
            };
        }
        Ok(operation)
    }

    async fn add_access_config(
        &self,
        _project: &str,
        zone: &str,
        name: &str,
        network_interface: &str,
        access_config: &AccessConfig,
    ) -> ApiResult<Operation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddAccessConfig {
            instance: name.to_string(),
            network_interface: network_interface.to_string(),
            access_config: access_config.clone(),
        });

        let (operation, apply) = state.mutation(name, &OperationScope::Zone(zone.to_string()));
        if apply {
            let fingerprint = state.next_fingerprint("tags");
            let instance = state.instance_mut(zone, name)?;
            // Instance-level changes move the tags fingerprint too.
            instance.tags.fingerprint = fingerprint;
            let nic = interface_mut(instance, network_interface)?;
            nic.access_configs.push(AccessConfig {
                nat_ip: ASSIGNED_NAT_IP.to_string(),
                ..access_config.clone()
            });
        }
        Ok(operation)
    }

    async fn delete_access_config(
        &self,
        _project: &str,
        zone: &str,
        name: &str,
        network_interface: &str,
        access_config: &str,
    ) -> ApiResult<Operation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteAccessConfig {
            instance: name.to_string(),
            network_interface: network_interface.to_string(),
            access_config: access_config.to_string(),
        });

        let (operation, apply) = state.mutation(name, &OperationScope::Zone(zone.to_string()));
        if apply {
            let fingerprint = state.next_fingerprint("tags");
            let instance = state.instance_mut(zone, name)?;
            instance.tags.fingerprint = fingerprint;
            let nic = interface_mut(instance, network_interface)?;
            nic.access_configs.retain(|ac| ac.name != access_config);
        }
        Ok(operation)
    }

    async fn get_target_pool(
        &self,
        _project: &str,
        region: &str,
        name: &str,
    ) -> ApiResult<TargetPool> {
        self.state
            .lock()
            .unwrap()
            .target_pools
            .get(name)
            .filter(|p| resource_name(&p.region) == region)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn list_target_pools_aggregated(
        &self,
        _project: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<TargetPool>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .target_pools
            .values()
            .filter(|p| p.name.ends_with(name_filter))
            .cloned()
            .collect())
    }

    async fn add_instance_to_target_pool(
        &self,
        _project: &str,
        region: &str,
        target_pool: &str,
        instance_self_link: &str,
    ) -> ApiResult<Operation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddInstanceToTargetPool {
            target_pool: target_pool.to_string(),
            instance: instance_self_link.to_string(),
        });

        let (operation, apply) =
            state.mutation(target_pool, &OperationScope::Region(region.to_string()));
        if apply {
            let pool = state
                .target_pools
                .get_mut(target_pool)
                .ok_or(ApiError::NotFound)?;
            pool.instances.push(instance_self_link.to_string());
        }
        Ok(operation)
    }

    async fn get_operation(
        &self,
        _project: &str,
        _scope: &OperationScope,
        operation: &str,
    ) -> ApiResult<Operation> {
        let mut state = self.state.lock().unwrap();
        state.operation_polls += 1;

        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(ApiError::Transport("connection reset by peer".into()));
        }

        let pending = state
            .operations
            .get_mut(operation)
            .ok_or(ApiError::NotFound)?;
        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            return Ok(Operation {
                status: OperationStatus::Running,
                ..pending.operation.clone()
            });
        }

        let error = pending.error.as_deref().map(error_payload);
        Ok(Operation {
            status: OperationStatus::Done,
            error,
            ..pending.operation.clone()
        })
    }
}

/// `"CODE: message"` becomes a single-entry error payload.
fn error_payload(error: &str) -> OperationErrors {
    let (code, message) = error.split_once(": ").unwrap_or(("ERROR", error));
    OperationErrors {
        errors: vec![OperationError {
            code: code.to_string(),
            message: message.to_string(),
        }],
    }
}

fn interface_mut<'a>(
    instance: &'a mut Instance,
    name: &str,
) -> ApiResult<&'a mut NetworkInterface> {
    instance
        .network_interfaces
        .iter_mut()
        .find(|nic| nic.name == name)
        .ok_or_else(|| ApiError::Status {
            code: 400,
            message: format!("network interface '{}' not found", name),
        })
}

/// Instance in [`ZONE`] bound to the `default` network with one interface and
/// no access config.
pub fn instance(name: &str) -> Instance {
    Instance {
        name: name.to_string(),
        zone: format!(
            "https://www.googleapis.com/compute/v1/projects/{}/zones/{}",
            PROJECT, ZONE
        ),
        self_link: self_link(name),
        can_ip_forward: false,
        network_interfaces: vec![NetworkInterface {
            name: "nic0".to_string(),
            network: format!(
                "https://www.googleapis.com/compute/v1/projects/{}/global/networks/default",
                PROJECT
            ),
            network_ip: "10.0.0.2".to_string(),
            access_configs: Vec::new(),
        }],
        tags: Tags {
            fingerprint: "tags-initial".to_string(),
            items: Vec::new(),
        },
        metadata: Metadata {
            fingerprint: "metadata-initial".to_string(),
            items: Vec::new(),
        },
    }
}

pub fn self_link(name: &str) -> String {
    format!(
        "https://www.googleapis.com/compute/v1/projects/{}/zones/{}/instances/{}",
        PROJECT, ZONE, name
    )
}

pub fn target_pool(name: &str, members: &[&str]) -> TargetPool {
    TargetPool {
        name: name.to_string(),
        region: format!(
            "https://www.googleapis.com/compute/v1/projects/{}/regions/{}",
            PROJECT, REGION
        ),
        self_link: format!(
            "https://www.googleapis.com/compute/v1/projects/{}/regions/{}/targetPools/{}",
            PROJECT, REGION, name
        ),
        instances: members.iter().map(|m| self_link(m)).collect(),
    }
}
