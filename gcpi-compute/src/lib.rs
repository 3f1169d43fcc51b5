//! gcpi-compute: network reconciliation for Compute Engine instances.
//!
//! Compares a caller-supplied network configuration with the live instance
//! and converges it through idempotent, fingerprint-guarded mutations:
//! - [`operation`] waits for remote operations to finish
//! - [`locator`] finds instances and target pools, treating absence as `None`
//! - [`metadata`] merges metadata documents
//! - [`reconciler`] holds the tag, access config and target pool reconcilers
//! - [`engine`] sequences them and detects changes that need a recreate

pub mod compute;
pub mod engine;
pub mod error;
pub mod locator;
pub mod metadata;
pub mod network_config;
pub mod operation;
pub mod reconciler;

#[cfg(test)]
mod testing;

pub use compute::{ApiError, ComputeApi, RestCompute};
pub use engine::NetworkEngine;
pub use error::{CpiError, Result};
pub use network_config::{DesiredNetworkConfig, Networks};
pub use operation::{OperationScope, OperationWaiter, WaiterConfig};
pub use reconciler::Outcome;
