use std::collections::BTreeMap;

use nclc_domain::{CapacityType, OsDiskType};
use tokio::sync::oneshot;

use crate::error::BatchError;

/// The subset of a VM/Machine template that must be identical across every
/// member of a batch (§4.4 "Template hash"). Per-request variations (machine
/// name, zones, tags) are deliberately excluded — they travel out-of-band in
/// the batch header (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreateTemplate {
    pub vm_size: String,
    pub capacity_type: CapacityType,
    pub orchestrator_version: String,
    pub os_family: String,
    pub os_disk_size_gb: u32,
    pub os_disk_type: OsDiskType,
    pub fips: bool,
    pub max_pods: Option<u32>,
    pub subnet_id: Option<String>,
    pub kubelet_config: nclc_domain::KubeletConfig,
    pub gpu_profile: Option<String>,
    pub agent_pool_mode: String,
}

impl CreateTemplate {
    /// A stable hash used to key the grouper's batch map. `Hash`'s own
    /// output isn't portable across runs, which is fine — the hash only
    /// needs to be consistent within one process's batch map lifetime.
    pub fn template_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Per-request variations that travel out-of-band from the template hash
/// (§4.4, §4.5): the coordinator lists one of these per request in the batch
/// header.
#[derive(Debug, Clone)]
pub struct CreateVariation {
    pub machine_name: String,
    pub zones: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

/// Result of one machine's create, as fanned out by the coordinator (§4.5.4).
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub machine_name: String,
    pub batch_id: uuid::Uuid,
}

/// One in-flight batched create request (§3 CreateRequest).
///
/// Owned by the grouper until it is dispatched to the coordinator; owned by
/// the coordinator until the response channel is written; owned by the
/// caller afterward. No back-pointer to its batch beyond the batch-ID string
/// surfaced in [`CreateOutcome`] (§9 "Cyclic graphs").
pub struct CreateRequest {
    pub template: CreateTemplate,
    pub variation: CreateVariation,
    /// The full per-machine body the coordinator sends to the cloud, opaque
    /// to the grouper (it only inspects `template`/`variation`).
    pub full_body: serde_json::Value,
    response_tx: oneshot::Sender<Result<CreateOutcome, BatchError>>,
}

impl CreateRequest {
    pub fn new(
        template: CreateTemplate,
        variation: CreateVariation,
        full_body: serde_json::Value,
    ) -> (Self, oneshot::Receiver<Result<CreateOutcome, BatchError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { template, variation, full_body, response_tx: tx }, rx)
    }

    /// Fan a result to this request's caller. Best-effort: the caller may
    /// already have dropped the receiver (e.g. its own context was
    /// cancelled) — that's not a bug in the coordinator.
    pub fn resolve(self, result: Result<CreateOutcome, BatchError>) {
        let _ = self.response_tx.send(result);
    }

    pub fn machine_name(&self) -> &str {
        &self.variation.machine_name
    }
}

/// Group of [`CreateRequest`]s sharing a template hash (§3 PendingBatch).
///
/// Invariant: every request in `requests` has a `template` equal to
/// `template` (enforced by the grouper never inserting a mismatched request
/// under an existing hash bucket).
pub struct PendingBatch {
    pub template: CreateTemplate,
    pub requests: Vec<CreateRequest>,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
