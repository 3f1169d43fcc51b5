//! Configuration file loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use gcpi_compute::WaiterConfig;
use gcpi_compute::compute::rest::DEFAULT_ENDPOINT;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub google: GoogleConfig,
    #[serde(default)]
    pub operation: OperationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub project: String,
    /// Zone searched first when locating instances.
    #[serde(default)]
    pub default_zone: Option<String>,
    /// Bearer token; the command line and environment take precedence.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Operation poll timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for OperationConfig {
    fn default() -> Self {
        let defaults = WaiterConfig::default();
        Self {
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            max_poll_interval_ms: defaults.max_poll_interval.as_millis() as u64,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl OperationConfig {
    pub fn waiter_config(&self) -> WaiterConfig {
        WaiterConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_poll_interval: Duration::from_millis(self.max_poll_interval_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Config {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.google.project.is_empty() {
            bail!("google.project must be set");
        }
        let op = &self.operation;
        if op.poll_interval_ms == 0 || op.timeout_secs == 0 {
            bail!("operation.poll_interval_ms and operation.timeout_secs must be positive");
        }
        if op.max_poll_interval_ms < op.poll_interval_ms {
            bail!("operation.max_poll_interval_ms must not be below operation.poll_interval_ms");
        }
        Ok(())
    }
}
