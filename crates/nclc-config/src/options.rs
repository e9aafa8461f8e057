use std::collections::BTreeMap;
use std::time::Duration;

use nclc_domain::RESERVED_TAG_KEYS;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::raw::RawOptions;

/// Which provisioning backend is active for this controller instance (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ProvisionMode {
    /// Low-level per-VM API (C6).
    AksScriptless,
    /// Cluster-managed Machine API (C7).
    AksMachineApi,
}

impl std::str::FromStr for ProvisionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AKSScriptless" => Ok(ProvisionMode::AksScriptless),
            "AKSMachineAPI" => Ok(ProvisionMode::AksMachineApi),
            other => Err(ConfigError::Invalid {
                field: "provision_mode".into(),
                message: format!(
                    "unknown value '{other}', expected 'AKSScriptless' or 'AKSMachineAPI'"
                ),
            }),
        }
    }
}

impl std::fmt::Display for ProvisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionMode::AksScriptless => write!(f, "AKSScriptless"),
            ProvisionMode::AksMachineApi => write!(f, "AKSMachineAPI"),
        }
    }
}

/// Batching layer configuration (§4.4 "Configuration (recognized options)").
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub enabled: bool,
    pub idle_timeout: Duration,
    pub max_timeout: Duration,
    pub max_batch_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_millis(2_000),
            max_batch_size: 50,
        }
    }
}

/// The fully-resolved, validated set of recognized configuration options (§6).
#[derive(Debug, Clone)]
pub struct Options {
    pub provision_mode: ProvisionMode,
    pub manage_existing_aks_machines: bool,
    pub batch: BatchOptions,
    pub use_sig: bool,
    pub subnet_id: Option<String>,
    pub node_resource_group: String,
    pub cluster_name: String,
    pub cluster_id: String,
    pub aks_machines_pool_name: String,
    pub kubelet_identity_client_id: Option<String>,
    /// Extra tags applied to every instance. May not use [`nclc_domain::RESERVED_TAG_KEYS`].
    pub additional_tags: BTreeMap<String, String>,
}

impl Options {
    /// Convert a parsed [`RawOptions`] document into a validated [`Options`],
    /// the way the teacher's `loader` converts Raw → Domain structs.
    pub fn from_raw(raw: RawOptions) -> Result<Self, ConfigError> {
        let provision_mode = raw
            .provision_mode
            .as_deref()
            .unwrap_or("AKSScriptless")
            .parse()?;

        for key in raw.additional_tags.keys() {
            let encoded = nclc_domain::encode_tag_key(key);
            if RESERVED_TAG_KEYS.contains(&encoded.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "additional_tags".into(),
                    message: format!("'{key}' collides with a reserved tag key"),
                });
            }
        }

        let batch = BatchOptions {
            enabled: raw.batch_creation_enabled.unwrap_or(true),
            idle_timeout: Duration::from_millis(raw.batch_idle_timeout_ms.unwrap_or(100)),
            max_timeout: Duration::from_millis(raw.batch_max_timeout_ms.unwrap_or(2_000)),
            max_batch_size: raw.max_batch_size.unwrap_or(50).max(1),
        };

        Ok(Self {
            provision_mode,
            manage_existing_aks_machines: raw.manage_existing_aks_machines.unwrap_or(false),
            batch,
            use_sig: raw.use_sig.unwrap_or(false),
            subnet_id: raw.subnet_id,
            node_resource_group: raw.node_resource_group.unwrap_or_default(),
            cluster_name: raw.cluster_name.unwrap_or_default(),
            cluster_id: raw.cluster_id.unwrap_or_default(),
            aks_machines_pool_name: raw.aks_machines_pool_name.unwrap_or_else(|| "aks-machines".into()),
            kubelet_identity_client_id: raw.kubelet_identity_client_id,
            additional_tags: raw.additional_tags,
        })
    }
}
