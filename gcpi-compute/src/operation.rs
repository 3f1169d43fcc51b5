//! Operation waiter - drives remote mutations to a terminal state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::compute::{ComputeApi, Operation, resource_name};
use crate::error::{CpiError, Result};

/// Where an operation lives. Exactly one scope applies to any operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationScope {
    Zone(String),
    Region(String),
    Global,
}

impl OperationScope {
    /// Builds a scope from zone and region strings; both empty means global.
    /// URLs are reduced to their last path segment.
    pub fn from_parts(zone: &str, region: &str) -> Self {
        if !zone.is_empty() {
            OperationScope::Zone(resource_name(zone).to_string())
        } else if !region.is_empty() {
            OperationScope::Region(resource_name(region).to_string())
        } else {
            OperationScope::Global
        }
    }
}

impl fmt::Display for OperationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationScope::Zone(zone) => write!(f, "zone {}", zone),
            OperationScope::Region(region) => write!(f, "region {}", region),
            OperationScope::Global => f.write_str("global"),
        }
    }
}

/// Poll timing for [`OperationWaiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterConfig {
    /// Delay before the first poll.
    pub poll_interval: Duration,
    /// Upper bound for the doubling delay between polls.
    pub max_poll_interval: Duration,
    /// Wall-clock bound for the whole wait.
    pub timeout: Duration,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Polls operations until the remote side reports `DONE`.
#[derive(Clone)]
pub struct OperationWaiter {
    compute: Arc<dyn ComputeApi>,
    project: String,
    config: WaiterConfig,
}

impl OperationWaiter {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        project: impl Into<String>,
        config: WaiterConfig,
    ) -> Self {
        Self {
            compute,
            project: project.into(),
            config,
        }
    }

    /// Waits for `operation` to finish.
    ///
    /// Failed polls are retried until the deadline. A finished operation with
    /// an error payload becomes [`CpiError::OperationFailed`]; running out of
    /// time becomes [`CpiError::OperationTimeout`]. A timeout too large to
    /// represent as an instant means the wait is unbounded.
    pub async fn wait(&self, operation: Operation, scope: &OperationScope) -> Result<Operation> {
        let deadline = Instant::now().checked_add(self.config.timeout);
        let mut interval = self.config.poll_interval;
        let mut current = operation;

        loop {
            if current.is_done() {
                if let Some(errors) = current.failure() {
                    return Err(CpiError::OperationFailed {
                        operation: current.name.clone(),
                        target: current.target_link.clone(),
                        message: errors.to_string(),
                    });
                }
                debug!(operation = %current.name, %scope, "Operation done");
                return Ok(current);
            }

            let delay = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CpiError::OperationTimeout {
                            operation: current.name.clone(),
                            timeout: self.config.timeout,
                        });
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };

            tokio::time::sleep(delay).await;
            interval = interval.saturating_mul(2).min(self.config.max_poll_interval);

            match self
                .compute
                .get_operation(&self.project, scope, &current.name)
                .await
            {
                Ok(polled) => {
                    debug!(operation = %polled.name, status = ?polled.status, "Polled operation");
                    current = polled;
                }
                Err(e) => {
                    warn!(
                        operation = %current.name,
                        %scope,
                        "Polling operation failed, retrying: {}",
                        e
                    );
                }
            }
        }
    }
}
