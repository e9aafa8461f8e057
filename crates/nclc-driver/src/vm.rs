use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nclc_cache::OfferingCache;
use nclc_domain::{
    merge_tags_checked, Backend, Instance, InstanceType, NodeClaim, NodeClass, OsDiskType,
    ProviderId, TAG_CLUSTER, TAG_NODEPOOL,
};
use tracing::{debug, info, warn};

use crate::driver::{Nic, Provider};
use crate::error::DriverError;
use crate::naming::{claim_name_from_instance_name, vm_instance_name, VM_NAME_PREFIX};
use crate::promise::{PollerPromise, Promise, DEFAULT_POLL_INTERVAL};
use crate::selection::{eligible_types_for_disk_policy, resolve_os_disk, select_offering};

/// Outcome of polling one LRO (`BeginCreateOrUpdate`) by its operation handle.
///
/// `Failed` carries the cloud error kind (§4.3) alongside the raw message:
/// the cloud SDK's error code is what the classifier consumes, and this
/// trait is the boundary where that code first becomes visible to the core.
pub enum PollOutcome {
    Pending,
    Succeeded(Instance),
    Failed { kind: nclc_domain::CloudErrorKind, message: String },
}

/// An in-flight LRO handle, as returned by `begin_create_or_update`. Opaque to
/// everything except the concrete [`VmApiClient`] that produced it.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub operation_id: String,
    pub resource_name: String,
}

/// The low-level per-VM cloud API surface (C6), external collaborator (§1).
/// Production wiring talks to the real VM management API over HTTPS; tests
/// supply an in-memory double.
#[async_trait]
pub trait VmApiClient: Send + Sync {
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        body: serde_json::Value,
    ) -> Result<OperationHandle, DriverError>;

    async fn poll_operation(&self, op: &OperationHandle) -> Result<PollOutcome, DriverError>;

    async fn get(&self, resource_group: &str, name: &str) -> Result<Instance, DriverError>;

    async fn list(&self, resource_group: &str) -> Result<Vec<Instance>, DriverError>;

    async fn delete(&self, resource_group: &str, name: &str) -> Result<(), DriverError>;

    async fn get_nic(&self, resource_group: &str, nic_name: &str) -> Result<Nic, DriverError>;
}

/// VM backend (C6): per-instance create/get/list/delete against the
/// low-level API, with instance-type selection, ephemeral-disk policy, and
/// idempotent reuse folded into `begin_create` per §4.6.
pub struct VmBackend {
    client: Arc<dyn VmApiClient>,
    cache: Arc<OfferingCache>,
    resource_group: String,
    cluster_name: String,
}

impl VmBackend {
    pub fn new(client: Arc<dyn VmApiClient>, cache: Arc<OfferingCache>, resource_group: String, cluster_name: String) -> Self {
        Self { client, cache, resource_group, cluster_name }
    }

    fn pool_name(&self, node_claim: &NodeClaim) -> String {
        node_claim
            .labels
            .get(nclc_domain::LABEL_NODEPOOL)
            .cloned()
            .unwrap_or_else(|| "standalone".to_string())
    }

    fn build_body(
        &self,
        node_class: &NodeClass,
        node_claim: &NodeClaim,
        instance_type: &InstanceType,
        offering: &nclc_domain::Offering,
    ) -> Result<serde_json::Value, DriverError> {
        let (os_disk_type, os_disk_size_gb) = resolve_os_disk(node_class, instance_type);

        let mut tags: BTreeMap<String, String> = BTreeMap::new();
        tags.insert(TAG_CLUSTER.to_string(), self.cluster_name.clone());
        tags.insert(TAG_NODEPOOL.to_string(), self.pool_name(node_claim));
        let tags = merge_tags_checked(tags, &node_class.tags)
            .map_err(|e| DriverError::fatal(e.to_string()))?;

        Ok(serde_json::json!({
            "vmSize": instance_type.name,
            "zone": offering.zone,
            "capacityType": offering.capacity_type.as_str(),
            "imageFamily": node_class.image_family,
            "osDiskType": match os_disk_type { OsDiskType::Managed => "Managed", OsDiskType::Ephemeral => "Ephemeral" },
            "osDiskSizeGb": os_disk_size_gb,
            "subnetId": node_class.subnet_id,
            "encryptionAtHost": node_class.encryption_at_host,
            "tags": tags,
        }))
    }

    fn instance_from_reuse(&self, existing: Instance, chosen_type: &str, chosen_zone: &str) -> Option<Instance> {
        // §4.6 idempotent reuse: compatible iff zone and SKU match the chosen offering.
        if existing.size == chosen_type && existing.zone == chosen_zone {
            Some(existing)
        } else {
            None
        }
    }
}

#[async_trait]
impl Provider for VmBackend {
    async fn begin_create(
        &self,
        node_class: &NodeClass,
        node_claim: &NodeClaim,
        instance_types: &[InstanceType],
    ) -> Result<Promise, DriverError> {
        let name = vm_instance_name(&node_claim.name);
        let eligible = eligible_types_for_disk_policy(instance_types, node_class);

        // Idempotent reuse: GET-before-create (§4.6).
        match self.client.get(&self.resource_group, &name).await {
            Ok(existing) => {
                let chosen = select_offering(&eligible, node_claim, &self.cache)?;
                if let Some(reused) = self.instance_from_reuse(existing.clone(), &chosen.instance_type.name, &chosen.offering.zone) {
                    info!(name = %name, "reusing existing VM with compatible configuration");
                    return Ok(Promise::Resolved(reused));
                }
                warn!(name = %name, "existing VM has incompatible configuration, deleting before re-create");
                self.client.delete(&self.resource_group, &name).await.or_else(|e| match e {
                    DriverError::NotFound(_) => Ok(()),
                    other => Err(other),
                })?;
            }
            Err(DriverError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let chosen = select_offering(&eligible, node_claim, &self.cache)?;
        let body = self.build_body(node_class, node_claim, &chosen.instance_type, &chosen.offering)?;
        let tags = match body.get("tags").cloned() {
            Some(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };
        let (os_disk_type, _) = resolve_os_disk(node_class, &chosen.instance_type);
        let provisional = Instance {
            name: name.clone(),
            provider_id: vm_provider_id("", &self.resource_group, &name),
            size: chosen.instance_type.name.clone(),
            zone: chosen.offering.zone.clone(),
            capacity_type: chosen.offering.capacity_type,
            image_reference: node_class.image_family.clone(),
            tags,
            created_at: Utc::now(),
            subnet_id: node_class.subnet_id.clone(),
            encryption_at_host: Some(node_class.encryption_at_host),
            backend: Backend::Vm,
            node_name: None,
            kubelet_version: None,
            node_deleting: false,
            kubelet_identity_client_id: None,
            drift_action: None,
        };
        let _ = os_disk_type;

        debug!(name = %name, sku = %chosen.instance_type.name, zone = %chosen.offering.zone, "submitting VM create");
        let op = self.client.begin_create_or_update(&self.resource_group, &name, body).await?;

        Ok(Promise::Poller(PollerPromise {
            instance_name: name,
            resource_group: self.resource_group.clone(),
            client: self.client.clone(),
            operation: op,
            poll_interval: DEFAULT_POLL_INTERVAL,
            resolved: None,
            provisional,
        }))
    }

    async fn get(&self, name: &str) -> Result<Instance, DriverError> {
        self.client.get(&self.resource_group, name).await
    }

    async fn list(&self) -> Result<Vec<Instance>, DriverError> {
        self.client.list(&self.resource_group).await
    }

    async fn delete(&self, name: &str) -> Result<(), DriverError> {
        self.client.delete(&self.resource_group, name).await
    }

    async fn get_nic(&self, resource_group: &str, nic_name: &str) -> Result<Nic, DriverError> {
        self.client.get_nic(resource_group, nic_name).await
    }
}

/// Provider ID builder for VM-backend instances (§6 "Provider-ID format").
pub fn vm_provider_id(region: &str, resource_group: &str, instance_name: &str) -> ProviderId {
    ProviderId::new(format!("azure:///subscriptions/x/resourceGroups/{resource_group}/providers/Microsoft.Compute/virtualMachines/{instance_name}?region={region}"))
        .expect("non-empty provider id literal")
}

/// Strip the VM prefix back to the NodeClaim name — thin wrapper kept local
/// to this module for symmetry with [`claim_name_from_instance_name`].
pub fn vm_claim_name(instance_name: &str) -> &str {
    claim_name_from_instance_name(instance_name)
}

pub fn is_vm_backend_instance(instance: &Instance) -> bool {
    instance.backend == Backend::Vm
}

pub fn vm_name_prefix() -> &'static str {
    VM_NAME_PREFIX
}

#[cfg(test)]
mod tests {
    use super::*;
    use nclc_domain::{CapacityType, KubeletConfig, NodeClassName, Offering, ReadyCondition, Requirement, ResourceList};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn sample_node_class() -> NodeClass {
        NodeClass {
            name: NodeClassName::new("default").unwrap(),
            image_family: "ubuntu".into(),
            os_disk_size_gb: 128,
            os_disk_type: OsDiskType::Managed,
            kubelet_config: KubeletConfig::default(),
            subnet_id: Some("subnet-1".into()),
            tags: BTreeMap::new(),
            encryption_at_host: false,
            content_hash: Some("h1".into()),
            hash_version: Some("v1".into()),
            ready: ReadyCondition::True,
            kubernetes_version: Some("1.29.0".into()),
            images_ready: true,
            allowed_image_ids: vec!["img-1".into()],
            deletion_timestamp: None,
        }
    }

    fn sample_instance_type(name: &str, zone: &str, price: f64) -> InstanceType {
        InstanceType {
            name: name.to_string(),
            family: "Dv3".into(),
            vcpus: 2,
            requirement_values: BTreeMap::new(),
            offerings: vec![Offering { sku: name.to_string(), zone: zone.to_string(), capacity_type: CapacityType::OnDemand, price, available: true }],
            capacity: ResourceList::new(2000, 4 * 1024 * 1024 * 1024, 0),
            allocatable: ResourceList::new(1900, 3 * 1024 * 1024 * 1024, 0),
            ephemeral_disk_max_gb: None,
        }
    }

    fn sample_claim(zone: &str) -> NodeClaim {
        let mut nc = NodeClaim::new(nclc_domain::NodeClaimName::new("worker-1").unwrap(), ResourceList::new(1000, 1024, 0));
        nc.requirements.push(Requirement::in_values(nclc_domain::LABEL_ZONE, vec![zone.to_string()]));
        nc
    }

    struct FakeVmClient {
        existing: Mutex<Option<Instance>>,
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VmApiClient for FakeVmClient {
        async fn begin_create_or_update(&self, _rg: &str, name: &str, _body: serde_json::Value) -> Result<OperationHandle, DriverError> {
            self.created.lock().unwrap().push(name.to_string());
            Ok(OperationHandle { operation_id: "op-1".into(), resource_name: name.to_string() })
        }

        async fn poll_operation(&self, op: &OperationHandle) -> Result<PollOutcome, DriverError> {
            Ok(PollOutcome::Succeeded(Instance {
                name: op.resource_name.clone(),
                provider_id: vm_provider_id("region-1", "rg", &op.resource_name),
                size: "Standard_D2s_v3".into(),
                zone: "region-1".into(),
                capacity_type: CapacityType::OnDemand,
                image_reference: "img-1".into(),
                tags: BTreeMap::new(),
                created_at: Utc::now(),
                subnet_id: Some("subnet-1".into()),
                encryption_at_host: Some(false),
                backend: Backend::Vm,
                node_name: None,
                kubelet_version: None,
                node_deleting: false,
                kubelet_identity_client_id: None,
                drift_action: None,
            }))
        }

        async fn get(&self, _rg: &str, name: &str) -> Result<Instance, DriverError> {
            match &*self.existing.lock().unwrap() {
                Some(i) if i.name == name => Ok(i.clone()),
                _ => Err(DriverError::NotFound(name.to_string())),
            }
        }

        async fn list(&self, _rg: &str) -> Result<Vec<Instance>, DriverError> {
            Ok(self.existing.lock().unwrap().iter().cloned().collect())
        }

        async fn delete(&self, _rg: &str, _name: &str) -> Result<(), DriverError> {
            *self.existing.lock().unwrap() = None;
            Ok(())
        }

        async fn get_nic(&self, _rg: &str, _nic: &str) -> Result<Nic, DriverError> {
            Ok(Nic { name: "nic-1".into(), subnet_id: Some("subnet-1".into()) })
        }
    }

    #[tokio::test]
    async fn creates_new_instance_when_not_found() {
        let client = Arc::new(FakeVmClient { existing: Mutex::new(None), created: Mutex::new(vec![]) });
        let cache = Arc::new(OfferingCache::new());
        let backend = VmBackend::new(client.clone(), cache, "rg".into(), "my-cluster".into());

        let types = vec![sample_instance_type("Standard_D2s_v3", "region-1", 1.0)];
        let claim = sample_claim("region-1");
        let mut promise = backend.begin_create(&sample_node_class(), &claim, &types).await.unwrap();
        let instance = promise.wait().await.unwrap();

        assert_eq!(instance.name, "aks-worker-1");
        assert_eq!(client.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reuses_compatible_existing_instance() {
        let existing = Instance {
            name: "aks-worker-1".into(),
            provider_id: vm_provider_id("region-1", "rg", "aks-worker-1"),
            size: "Standard_D2s_v3".into(),
            zone: "region-1".into(),
            capacity_type: CapacityType::OnDemand,
            image_reference: "img-1".into(),
            tags: BTreeMap::new(),
            created_at: Utc::now(),
            subnet_id: None,
            encryption_at_host: None,
            backend: Backend::Vm,
            node_name: None,
            kubelet_version: None,
            node_deleting: false,
            kubelet_identity_client_id: None,
            drift_action: None,
        };
        let client = Arc::new(FakeVmClient { existing: Mutex::new(Some(existing)), created: Mutex::new(vec![]) });
        let cache = Arc::new(OfferingCache::new());
        let backend = VmBackend::new(client.clone(), cache, "rg".into(), "my-cluster".into());

        let types = vec![sample_instance_type("Standard_D2s_v3", "region-1", 1.0)];
        let claim = sample_claim("region-1");
        let mut promise = backend.begin_create(&sample_node_class(), &claim, &types).await.unwrap();
        let instance = promise.wait().await.unwrap();

        assert_eq!(instance.name, "aks-worker-1");
        assert!(client.created.lock().unwrap().is_empty(), "reuse must not submit a new create");
    }
}
