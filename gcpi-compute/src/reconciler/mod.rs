//! Reconcilers for individual instance attributes.
//!
//! Each reconciler compares the desired value with a fresh snapshot of the
//! instance and issues at most one mutation to converge, waiting for it to
//! finish before returning.

pub mod access_config;
pub mod tags;
pub mod target_pool;

use async_trait::async_trait;

use crate::compute::Instance;
use crate::error::Result;

pub use access_config::{AccessConfigReconciler, ExternalIp};
pub use tags::TagReconciler;
pub use target_pool::TargetPoolReconciler;

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Live state already matched; nothing was sent.
    Unchanged,
    /// A mutation was issued and finished successfully.
    Applied,
}

/// Trait for instance attribute reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The desired value for the attribute.
    type Desired: ?Sized + Sync;

    /// Compare `desired` with `instance` and converge if they differ.
    async fn reconcile(&self, instance: &Instance, desired: &Self::Desired) -> Result<Outcome>;
}
