//! Reconciliation error types.

use std::time::Duration;

use thiserror::Error;

use crate::compute::ApiError;

/// Errors surfaced by reconciliation calls.
#[derive(Debug, Error)]
pub enum CpiError {
    /// The desired change cannot be applied in place; the instance has to be
    /// recreated.
    #[error("instance '{instance}' must be recreated: {reason}")]
    NotSupported { instance: String, reason: String },

    /// A resource the call depends on does not exist.
    #[error("{0}")]
    PreconditionFailed(String),

    /// The remote operation finished and reported an error payload.
    #[error("operation '{operation}' on '{target}' failed: {message}")]
    OperationFailed {
        operation: String,
        target: String,
        message: String,
    },

    /// The poll loop gave up before the operation finished. The operation may
    /// still be running remotely.
    #[error("timed out after {timeout:?} waiting for operation '{operation}'")]
    OperationTimeout { operation: String, timeout: Duration },

    /// The caller named a target pool that does not exist.
    #[error("target pool '{0}' does not exist")]
    TargetPoolNotFound(String),

    /// The caller supplied a network configuration that cannot be applied.
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    /// A remote call failed before any operation was started.
    #[error("{context}: {source}")]
    Api {
        context: String,
        #[source]
        source: ApiError,
    },
}

impl CpiError {
    pub fn api(context: impl Into<String>, source: ApiError) -> Self {
        CpiError::Api {
            context: context.into(),
            source,
        }
    }

    pub fn not_supported(instance: &str, reason: impl Into<String>) -> Self {
        CpiError::NotSupported {
            instance: instance.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the only way forward is to destroy and recreate the instance.
    pub fn is_recreate_required(&self) -> bool {
        matches!(self, CpiError::NotSupported { .. })
    }

    /// Whether re-running the whole reconciliation may succeed without
    /// caller intervention.
    pub fn ok_to_retry(&self) -> bool {
        match self {
            CpiError::OperationTimeout { .. } => true,
            CpiError::Api { source, .. } => source.is_transient(),
            CpiError::NotSupported { .. }
            | CpiError::PreconditionFailed(_)
            | CpiError::OperationFailed { .. }
            | CpiError::TargetPoolNotFound(_)
            | CpiError::InvalidConfig(_) => false,
        }
    }
}

/// Result type for reconciliation calls.
pub type Result<T> = std::result::Result<T, CpiError>;
