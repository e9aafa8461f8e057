use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw YAML representation of the controller-wide options document (§6).
///
/// Unlike the teacher's per-enclave config (a directory of many small YAML
/// files), this system's configuration is process-global: one document, plus
/// environment overrides applied on top by [`crate::loader`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawOptions {
    pub provision_mode: Option<String>,
    pub manage_existing_aks_machines: Option<bool>,

    pub batch_creation_enabled: Option<bool>,
    pub batch_idle_timeout_ms: Option<u64>,
    pub batch_max_timeout_ms: Option<u64>,
    pub max_batch_size: Option<usize>,

    pub use_sig: Option<bool>,
    pub subnet_id: Option<String>,
    pub node_resource_group: Option<String>,
    pub cluster_name: Option<String>,
    pub cluster_id: Option<String>,
    pub aks_machines_pool_name: Option<String>,
    pub kubelet_identity_client_id: Option<String>,

    #[serde(default)]
    pub additional_tags: BTreeMap<String, String>,
}
