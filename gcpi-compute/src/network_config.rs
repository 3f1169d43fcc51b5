//! Desired network configuration derived from the caller's named networks.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::{CpiError, Result};
use crate::reconciler::access_config::ExternalIp;

/// Network identity used when the dynamic network names none.
pub const DEFAULT_NETWORK: &str = "default";

const MAX_TAG_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Dynamic,
    #[default]
    Manual,
    Vip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CloudProperties {
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ephemeral_external_ip: bool,
    #[serde(default)]
    pub ip_forwarding: bool,
    #[serde(default)]
    pub target_pool: String,
}

/// One named network as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Network {
    #[serde(rename = "type", default)]
    pub kind: NetworkType,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

pub type Networks = BTreeMap<String, Network>;

/// What one instance's network attachment should look like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredNetworkConfig {
    pub network_name: String,
    pub ip_forwarding: bool,
    pub ephemeral_external_ip: bool,
    /// Sorted, de-duplicated tag set.
    pub tags: Vec<String>,
    pub target_pool: Option<String>,
    /// Address of the vip network, when one is configured.
    pub vip: Option<String>,
}

impl DesiredNetworkConfig {
    /// Collapses the named networks into a single desired configuration.
    ///
    /// Exactly one dynamic network is required; it provides the network
    /// identity, IP forwarding, ephemeral IP and target pool. Tags are the
    /// union over all networks.
    pub fn from_networks(networks: &Networks) -> Result<Self> {
        let mut dynamic: Option<&Network> = None;
        let mut vip: Option<&Network> = None;
        let mut tags = BTreeSet::new();

        for (name, network) in networks {
            match network.kind {
                NetworkType::Dynamic => {
                    if dynamic.replace(network).is_some() {
                        return Err(CpiError::InvalidConfig(
                            "only one dynamic network is supported".into(),
                        ));
                    }
                }
                NetworkType::Vip => {
                    if network.ip.is_empty() {
                        return Err(CpiError::InvalidConfig(format!(
                            "vip network '{}' has no ip",
                            name
                        )));
                    }
                    if vip.replace(network).is_some() {
                        return Err(CpiError::InvalidConfig(
                            "only one vip network is supported".into(),
                        ));
                    }
                }
                NetworkType::Manual => {
                    return Err(CpiError::InvalidConfig(format!(
                        "network '{}': manual networks are not supported",
                        name
                    )));
                }
            }

            for tag in &network.cloud_properties.tags {
                validate_tag(name, tag)?;
                tags.insert(tag.clone());
            }
        }

        let dynamic = dynamic
            .ok_or_else(|| CpiError::InvalidConfig("a dynamic network is required".into()))?;
        let props = &dynamic.cloud_properties;

        if props.ephemeral_external_ip && vip.is_some() {
            return Err(CpiError::InvalidConfig(
                "ephemeral_external_ip cannot be combined with a vip network".into(),
            ));
        }

        let network_name = if props.network_name.is_empty() {
            DEFAULT_NETWORK.to_string()
        } else {
            props.network_name.clone()
        };

        Ok(Self {
            network_name,
            ip_forwarding: props.ip_forwarding,
            ephemeral_external_ip: props.ephemeral_external_ip,
            tags: tags.into_iter().collect(),
            target_pool: Some(props.target_pool.clone()).filter(|p| !p.is_empty()),
            vip: vip.map(|n| n.ip.clone()),
        })
    }

    pub fn external_ip(&self) -> ExternalIp {
        ExternalIp {
            ephemeral: self.ephemeral_external_ip,
            vip: self.vip.clone(),
        }
    }
}

/// Tags follow RFC 1035 labels: `[a-z]([-a-z0-9]*[a-z0-9])?`, at most 63 chars.
fn validate_tag(network: &str, tag: &str) -> Result<()> {
    let bytes = tag.as_bytes();
    let valid = match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_TAG_LEN
                && first.is_ascii_lowercase()
                && *last != b'-'
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(CpiError::InvalidConfig(format!(
            "network '{}': invalid tag '{}'",
            network, tag
        )))
    }
}
