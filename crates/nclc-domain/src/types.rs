use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Well-known label/tag keys ─────────────────────────────────────────────────

/// Selects the node pool a NodeClaim belongs to. Absent ⇒ "standalone" (§4.8).
pub const LABEL_NODEPOOL: &str = "node-pool";
pub const LABEL_CAPACITY_TYPE: &str = "capacity-type";
pub const LABEL_ZONE: &str = "topology.zone";
pub const LABEL_INSTANCE_TYPE: &str = "instance-type";

pub const TAG_CLUSTER: &str = "cluster";
pub const TAG_NODEPOOL: &str = "nodepool";

/// Reserved tag keys that user-supplied tags may never override (global invariant).
pub const RESERVED_TAG_KEYS: [&str; 2] = [TAG_CLUSTER, TAG_NODEPOOL];

/// NodeClaim annotation keys (§6 "Persisted state") — the only state this
/// system persists beyond the NodeClaim's own status fields.
pub const ANNOTATION_NODECLASS_HASH: &str = "nodeclass-hash";
pub const ANNOTATION_HASH_VERSION: &str = "nodeclass-hash-version";
pub const ANNOTATION_INPLACE_UPDATE_HASH: &str = "in-place-update-hash";
/// Present only on NodeClaims backed by the Machine backend; its presence is
/// what the dual-backend router's Delete path keys on (§4.9).
pub const ANNOTATION_MACHINE_RESOURCE_ID: &str = "machine-resource-id";

// ── Newtype identifiers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeClaimName(String);

impl NodeClaimName {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > 253 {
            return Err(DomainError::InvalidNodeClaimName(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeClaimName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeClassName(String);

impl NodeClassName {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > 253 {
            return Err(DomainError::InvalidNodeClassName(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A URI-like opaque identifier carrying region, resource group, and instance
/// name. Only the trailing name segment is interpreted by this system (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::InvalidProviderId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing path segment — the backend-encoded instance name.
    pub fn instance_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Capacity type ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityType {
    Spot,
    OnDemand,
}

impl CapacityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityType::Spot => "spot",
            CapacityType::OnDemand => "on-demand",
        }
    }

    pub fn all() -> [CapacityType; 2] {
        [CapacityType::Spot, CapacityType::OnDemand]
    }
}

impl fmt::Display for CapacityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CapacityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spot" => Ok(CapacityType::Spot),
            "on-demand" | "ondemand" | "on_demand" => Ok(CapacityType::OnDemand),
            other => Err(DomainError::InvalidCapacityType(other.to_string())),
        }
    }
}

// ── Cloud error kinds ──────────────────────────────────────────────────────────

/// Cloud error kinds the driver layer surfaces from a failed create/LRO (§4.3
/// table, left column). Lives in the domain crate rather than `nclc-catalog`
/// so the driver layer can attach a kind to a failure without depending on
/// the catalog crate; `nclc-catalog::ErrorClassifier` is what actually maps a
/// kind to an Offering Cache update and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudErrorKind {
    LowPriorityCoresQuota,
    OverconstrainedZonalAllocation,
    OverconstrainedAllocation,
    AllocationFailed,
    ZoneAllocationFailed,
    SkuNotAvailable,
    VmFamilyCoresQuotaExceeded,
    TotalRegionalCoresQuotaExceeded,
    NodeClassNotReady,
    Other,
}

// ── Requirements ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RequirementOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

/// One scheduling requirement: a label key, an operator, and the operator's
/// operand values (empty for Exists/DoesNotExist).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: RequirementOperator,
    pub values: Vec<String>,
}

impl Requirement {
    pub fn in_values(key: impl Into<String>, values: Vec<String>) -> Self {
        Self { key: key.into(), operator: RequirementOperator::In, values }
    }

    /// Whether a single candidate value for this requirement's key satisfies it.
    pub fn is_satisfied_by(&self, candidate: Option<&str>) -> bool {
        match self.operator {
            RequirementOperator::Exists => candidate.is_some(),
            RequirementOperator::DoesNotExist => candidate.is_none(),
            RequirementOperator::In => candidate.is_some_and(|c| self.values.iter().any(|v| v == c)),
            RequirementOperator::NotIn => candidate.is_none_or(|c| !self.values.iter().any(|v| v == c)),
            RequirementOperator::Gt | RequirementOperator::Lt => candidate
                .zip(self.values.first())
                .and_then(|(c, v)| Some((c.parse::<i64>().ok()?, v.parse::<i64>().ok()?)))
                .is_some_and(|(c, v)| if self.operator == RequirementOperator::Gt { c > v } else { c < v }),
        }
    }

    /// Whether this requirement is compatible with a *set* of values an instance
    /// type declares for the same key (used when filtering instance types: the
    /// type is kept if at least one of its values would satisfy the requirement).
    pub fn compatible_with_set(&self, type_values: &[String]) -> bool {
        match self.operator {
            RequirementOperator::Exists => !type_values.is_empty(),
            RequirementOperator::DoesNotExist => type_values.is_empty(),
            RequirementOperator::In => type_values.iter().any(|t| self.values.contains(t)),
            RequirementOperator::NotIn => type_values.iter().any(|t| !self.values.contains(t)),
            RequirementOperator::Gt | RequirementOperator::Lt => type_values.iter().any(|t| self.is_satisfied_by(Some(t))),
        }
    }
}

// ── Resources ──────────────────────────────────────────────────────────────────

/// cpu (millicores), memory (bytes), gpu count — the three resource dimensions
/// the spec names explicitly; nothing more is modeled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
    pub gpu_count: i64,
}

impl ResourceList {
    pub fn new(cpu_millis: i64, memory_bytes: i64, gpu_count: i64) -> Self {
        Self { cpu_millis, memory_bytes, gpu_count }
    }

    /// True iff `self` (a request) fits within `allocatable`.
    pub fn fits_within(&self, allocatable: &ResourceList) -> bool {
        self.cpu_millis <= allocatable.cpu_millis
            && self.memory_bytes <= allocatable.memory_bytes
            && self.gpu_count <= allocatable.gpu_count
    }
}

// ── NodeClaim ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeClaimStatus {
    pub provider_id: Option<ProviderId>,
    pub image_id: Option<String>,
    pub capacity: Option<ResourceList>,
    pub allocatable: Option<ResourceList>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClaim {
    pub name: NodeClaimName,
    pub labels: BTreeMap<String, String>,
    pub requirements: Vec<Requirement>,
    pub resources: ResourceList,
    pub node_class_ref: Option<NodeClassName>,
    #[serde(default)]
    pub status: NodeClaimStatus,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl NodeClaim {
    pub fn new(name: NodeClaimName, resources: ResourceList) -> Self {
        Self {
            name,
            labels: BTreeMap::new(),
            requirements: Vec::new(),
            resources,
            node_class_ref: None,
            status: NodeClaimStatus::default(),
            annotations: BTreeMap::new(),
        }
    }

    /// A NodeClaim without the node-pool label is handled synchronously (§4.8).
    pub fn is_standalone(&self) -> bool {
        !self.labels.contains_key(LABEL_NODEPOOL)
    }

    pub fn capacity_type_requirement(&self) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.key == LABEL_CAPACITY_TYPE)
    }

    pub fn zone_requirement(&self) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.key == LABEL_ZONE)
    }

    pub fn instance_type_requirement(&self) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.key == LABEL_INSTANCE_TYPE)
    }
}

// ── NodeClass ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsDiskType {
    Managed,
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ReadyCondition {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KubeletConfig {
    pub max_pods: Option<u32>,
    pub fips: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClass {
    pub name: NodeClassName,
    pub image_family: String,
    pub os_disk_size_gb: u32,
    pub os_disk_type: OsDiskType,
    pub kubelet_config: KubeletConfig,
    pub subnet_id: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub encryption_at_host: bool,
    /// Content hash of the above fields, stamped onto created NodeClaims for drift (§4.7.1).
    pub content_hash: Option<String>,
    pub hash_version: Option<String>,
    pub ready: ReadyCondition,
    pub kubernetes_version: Option<String>,
    pub images_ready: bool,
    pub allowed_image_ids: Vec<String>,
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl NodeClass {
    /// A NodeClass with a deletion timestamp set is treated as not-found (§3).
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

// ── InstanceType / Offering ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    pub sku: String,
    pub zone: String,
    pub capacity_type: CapacityType,
    pub price: f64,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    /// SKU family used for zone-allocation blast-radius blocking (§4.3 ZoneAllocationFailed).
    pub family: String,
    pub vcpus: u32,
    /// Requirement values this type satisfies, keyed by requirement key (e.g. "arch" → ["amd64"]).
    pub requirement_values: BTreeMap<String, Vec<String>>,
    pub offerings: Vec<Offering>,
    pub capacity: ResourceList,
    pub allocatable: ResourceList,
    /// Largest ephemeral OS disk size this SKU supports, if any (§4.6 ephemeral-disk policy).
    pub ephemeral_disk_max_gb: Option<u32>,
}

impl InstanceType {
    /// Whether every requirement is compatible with this type's declared requirement values.
    pub fn satisfies_requirements(&self, requirements: &[Requirement]) -> bool {
        requirements.iter().all(|req| {
            let empty = Vec::new();
            let values = self.requirement_values.get(&req.key).unwrap_or(&empty);
            req.compatible_with_set(values)
        })
    }

    pub fn has_available_offering(&self) -> bool {
        self.offerings.iter().any(|o| o.available)
    }
}

// ── Instance ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Vm,
    Machine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub provider_id: ProviderId,
    pub size: String,
    pub zone: String,
    pub capacity_type: CapacityType,
    pub image_reference: String,
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub subnet_id: Option<String>,
    pub encryption_at_host: Option<bool>,
    pub backend: Backend,
    /// Observed Node fields, populated once the kubelet registers (may lag instance creation).
    pub node_name: Option<String>,
    pub kubelet_version: Option<String>,
    pub node_deleting: bool,
    pub kubelet_identity_client_id: Option<String>,
    /// Cloud-set field on the Machine backend only (§4.7.6).
    pub drift_action: Option<String>,
}

impl Instance {
    pub fn set_reserved_tags(&mut self, cluster: &str, nodepool: &str) {
        self.tags.insert(TAG_CLUSTER.to_string(), cluster.to_string());
        self.tags.insert(TAG_NODEPOOL.to_string(), nodepool.to_string());
    }
}

// ── Drift ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DriftReason {
    NodeClassDrift,
    K8sVersionDrift,
    ImageVersionDrift,
    ImageDrift,
    SubnetDrift,
    KubeletIdentityDrift,
    ClusterConfigDrift,
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ── Tag key mapping (§9) ───────────────────────────────────────────────────────

/// Maps a user-facing tag key to its cloud-side encoding: `/` → `_`, unconditionally.
/// One direction only — lossy for keys that already contain `_` (§9 design note).
pub fn encode_tag_key(key: &str) -> String {
    key.replace('/', "_")
}

/// Merge `user_tags` into `reserved`, rejecting any user key that collides with a
/// reserved key post-encoding (global invariant: reserved keys are never overwritten).
pub fn merge_tags_checked(
    reserved: BTreeMap<String, String>,
    user_tags: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, DomainError> {
    let mut out = reserved;
    for (k, v) in user_tags {
        let encoded = encode_tag_key(k);
        if out.contains_key(&encoded) {
            return Err(DomainError::ReservedTagKey(encoded));
        }
        out.insert(encoded, v.clone());
    }
    Ok(out)
}

// ── Repair policy ──────────────────────────────────────────────────────────────

/// One entry in the `RepairPolicies()` contract (§6 "External interfaces"):
/// a Node condition this system will tolerate for a bounded duration before
/// the upstream scheduler forcibly replaces the NodeClaim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    pub condition_type: String,
    pub condition_status: String,
    pub toleration_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_requirement_satisfied_by_member() {
        let req = Requirement::in_values(LABEL_ZONE, vec!["region-1".into()]);
        assert!(req.is_satisfied_by(Some("region-1")));
        assert!(!req.is_satisfied_by(Some("region-2")));
        assert!(!req.is_satisfied_by(None));
    }

    #[test]
    fn exists_and_does_not_exist() {
        let exists = Requirement { key: "x".into(), operator: RequirementOperator::Exists, values: vec![] };
        assert!(exists.is_satisfied_by(Some("anything")));
        assert!(!exists.is_satisfied_by(None));

        let absent = Requirement { key: "x".into(), operator: RequirementOperator::DoesNotExist, values: vec![] };
        assert!(absent.is_satisfied_by(None));
        assert!(!absent.is_satisfied_by(Some("anything")));
    }

    #[test]
    fn resource_fit() {
        let want = ResourceList::new(2000, 4 * 1024 * 1024 * 1024, 0);
        let have = ResourceList::new(4000, 8 * 1024 * 1024 * 1024, 1);
        assert!(want.fits_within(&have));
        assert!(!have.fits_within(&want));
    }

    #[test]
    fn reserved_tags_cannot_be_overridden() {
        let mut reserved = BTreeMap::new();
        reserved.insert(TAG_CLUSTER.to_string(), "prod".to_string());
        let mut user = BTreeMap::new();
        user.insert(TAG_CLUSTER.to_string(), "evil".to_string());
        let err = merge_tags_checked(reserved, &user).unwrap_err();
        assert!(matches!(err, DomainError::ReservedTagKey(_)));
    }

    #[test]
    fn tag_key_encoding_is_one_directional() {
        assert_eq!(encode_tag_key("kubernetes.io/role"), "kubernetes.io_role");
        assert_eq!(encode_tag_key("already_has_underscore"), "already_has_underscore");
    }

    #[test]
    fn standalone_detection() {
        let mut nc = NodeClaim::new(NodeClaimName::new("a").unwrap(), ResourceList::default());
        assert!(nc.is_standalone());
        nc.labels.insert(LABEL_NODEPOOL.to_string(), "default".to_string());
        assert!(!nc.is_standalone());
    }
}
