//! Boundary to the Compute Engine API.
//!
//! Everything that leaves the process goes through [`ComputeApi`]. The REST
//! implementation lives in [`rest`]; tests use an in-memory double.

pub mod rest;
mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::operation::OperationScope;

pub use rest::RestCompute;
pub use types::*;

/// Errors returned by a single Compute Engine API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed resource does not exist (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// Any other non-success HTTP status, e.g. 412 on a stale fingerprint.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether re-issuing the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { code, .. } => *code == 412 || *code == 429 || *code >= 500,
            ApiError::NotFound | ApiError::Decode(_) => false,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Compute Engine calls consumed by the reconcilers.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_instance(&self, project: &str, zone: &str, name: &str) -> ApiResult<Instance>;

    /// Aggregated listing over all zones, filtered by name.
    async fn list_instances_aggregated(
        &self,
        project: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<Instance>>;

    async fn set_tags(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        tags: &Tags,
    ) -> ApiResult<Operation>;

    async fn set_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        metadata: &Metadata,
    ) -> ApiResult<Operation>;

    async fn add_access_config(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        network_interface: &str,
        access_config: &AccessConfig,
    ) -> ApiResult<Operation>;

    async fn delete_access_config(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        network_interface: &str,
        access_config: &str,
    ) -> ApiResult<Operation>;

    async fn get_target_pool(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> ApiResult<TargetPool>;

    /// Aggregated listing over all regions, filtered by name.
    async fn list_target_pools_aggregated(
        &self,
        project: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<TargetPool>>;

    async fn add_instance_to_target_pool(
        &self,
        project: &str,
        region: &str,
        target_pool: &str,
        instance_self_link: &str,
    ) -> ApiResult<Operation>;

    async fn get_operation(
        &self,
        project: &str,
        scope: &OperationScope,
        operation: &str,
    ) -> ApiResult<Operation>;
}

/// Last path segment of a resource URL.
///
/// `https://.../zones/us-central1-a` becomes `us-central1-a`; bare names are
/// returned unchanged.
pub fn resource_name(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}
