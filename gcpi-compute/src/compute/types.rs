//! Compute Engine resource representations.
//!
//! Field names follow the v1 JSON wire format so the same types are used by
//! the REST client and by in-memory doubles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the single access config this crate ever creates.
pub const EXTERNAL_NAT_NAME: &str = "External NAT";

/// Access config type for an ephemeral one-to-one NAT address.
pub const ONE_TO_ONE_NAT: &str = "ONE_TO_ONE_NAT";

/// A virtual machine instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    /// Zone URL (or bare zone name).
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub can_ip_forward: bool,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Instance {
    /// The interface at position 0. Multi-NIC instances are not reconciled
    /// beyond this interface.
    pub fn primary_interface(&self) -> Option<&NetworkInterface> {
        self.network_interfaces.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub name: String,
    /// Network URL the interface is bound to.
    #[serde(default)]
    pub network: String,
    #[serde(default, rename = "networkIP", skip_serializing_if = "String::is_empty")]
    pub network_ip: String,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

/// Binding of an external address to a network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, rename = "natIP", skip_serializing_if = "String::is_empty")]
    pub nat_ip: String,
}

impl AccessConfig {
    /// Ephemeral one-to-one NAT named "External NAT".
    pub fn external_nat() -> Self {
        Self {
            name: EXTERNAL_NAT_NAME.to_string(),
            kind: ONE_TO_ONE_NAT.to_string(),
            nat_ip: String::new(),
        }
    }
}

/// Fingerprinted network tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Fingerprinted key/value metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Load-balancing target pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPool {
    pub name: String,
    /// Region URL (or bare region name).
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub self_link: String,
    /// Self links of member instances.
    #[serde(default)]
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    #[default]
    Pending,
    Running,
    Done,
}

/// Handle to an in-flight remote mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: OperationStatus,
    #[serde(default)]
    pub operation_type: String,
    #[serde(default)]
    pub target_link: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationErrors>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Error payload of a finished operation, if it carries any entries.
    pub fn failure(&self) -> Option<&OperationErrors> {
        self.error.as_ref().filter(|e| !e.errors.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationErrors {
    #[serde(default)]
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for OperationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.code, e.message)?;
        }
        Ok(())
    }
}
