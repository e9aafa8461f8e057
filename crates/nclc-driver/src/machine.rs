use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nclc_batch::{BatchGrouper, CreateTemplate, CreateVariation};
use nclc_cache::OfferingCache;
use nclc_domain::{
    merge_tags_checked, Backend, Instance, InstanceType, NodeClaim, NodeClass, OsDiskType,
    ProviderId, TAG_CLUSTER, TAG_NODEPOOL,
};
use tracing::{debug, info, warn};

use crate::driver::Provider;
use crate::error::DriverError;
use crate::naming::machine_instance_name;
use crate::promise::{PolledStatusPromise, Promise, DEFAULT_POLL_INTERVAL};
use crate::selection::{eligible_types_for_disk_policy, resolve_os_disk, select_offering};

/// Status of one machine as observed via GET (§4.6 "per-machine polling is
/// done via a GET-based poller"). `Failed` carries the cloud error kind
/// (§4.3) the same way `vm::PollOutcome::Failed` does.
pub enum MachineStatus {
    Creating,
    Succeeded(Instance),
    Failed { kind: nclc_domain::CloudErrorKind, message: String },
}

/// The cluster-managed Machine API surface the backend consumes (§1, §4.6).
/// Delete uses a distinct API (`delete-machines` against an agent pool) from
/// create, which goes through the batching layer instead.
#[async_trait]
pub trait MachineApiClient: Send + Sync {
    async fn get_status(&self, resource_group: &str, name: &str) -> Result<MachineStatus, DriverError>;

    async fn get(&self, resource_group: &str, name: &str) -> Result<Instance, DriverError>;

    async fn list(&self, resource_group: &str, agent_pool_name: &str) -> Result<Vec<Instance>, DriverError>;

    async fn delete_machines(&self, resource_group: &str, agent_pool_name: &str, names: &[String]) -> Result<(), DriverError>;
}

/// Machine backend (C7): same [`Provider`] contract as the VM backend, but
/// `begin_create` routes through the [`BatchGrouper`] (C4/C5) instead of
/// calling the cloud directly, and delete goes through agent-pool
/// `delete-machines` rather than a per-resource delete (§4.6).
pub struct MachineBackend {
    client: Arc<dyn MachineApiClient>,
    grouper: BatchGrouper,
    cache: Arc<OfferingCache>,
    resource_group: String,
    cluster_name: String,
    agent_pool_name: String,
}

impl MachineBackend {
    pub fn new(
        client: Arc<dyn MachineApiClient>,
        grouper: BatchGrouper,
        cache: Arc<OfferingCache>,
        resource_group: String,
        cluster_name: String,
        agent_pool_name: String,
    ) -> Self {
        Self { client, grouper, cache, resource_group, cluster_name, agent_pool_name }
    }

    fn pool_name(&self, node_claim: &NodeClaim) -> String {
        node_claim
            .labels
            .get(nclc_domain::LABEL_NODEPOOL)
            .cloned()
            .unwrap_or_else(|| "standalone".to_string())
    }
}

#[async_trait]
impl Provider for MachineBackend {
    async fn begin_create(
        &self,
        node_class: &NodeClass,
        node_claim: &NodeClaim,
        instance_types: &[InstanceType],
    ) -> Result<Promise, DriverError> {
        let name = machine_instance_name(&node_claim.name);
        let eligible = eligible_types_for_disk_policy(instance_types, node_class);

        // Idempotent reuse (§4.6), same contract as the VM backend.
        match self.client.get(&self.resource_group, &name).await {
            Ok(existing) => {
                let chosen = select_offering(&eligible, node_claim, &self.cache)?;
                if existing.size == chosen.instance_type.name && existing.zone == chosen.offering.zone {
                    info!(name = %name, "reusing existing Machine with compatible configuration");
                    return Ok(Promise::Resolved(existing));
                }
                warn!(name = %name, "existing Machine has incompatible configuration, deleting before re-create");
                let names = [name.clone()];
                self.client.delete_machines(&self.resource_group, &self.agent_pool_name, &names).await.or_else(|e| match e {
                    DriverError::NotFound(_) => Ok(()),
                    other => Err(other),
                })?;
            }
            Err(DriverError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let chosen = select_offering(&eligible, node_claim, &self.cache)?;
        let (os_disk_type, os_disk_size_gb) = resolve_os_disk(node_class, &chosen.instance_type);

        let mut reserved: BTreeMap<String, String> = BTreeMap::new();
        reserved.insert(TAG_CLUSTER.to_string(), self.cluster_name.clone());
        reserved.insert(TAG_NODEPOOL.to_string(), self.pool_name(node_claim));
        let tags = merge_tags_checked(reserved, &node_class.tags).map_err(|e| DriverError::fatal(e.to_string()))?;

        let template = CreateTemplate {
            vm_size: chosen.instance_type.name.clone(),
            capacity_type: chosen.offering.capacity_type,
            orchestrator_version: node_class.kubernetes_version.clone().unwrap_or_default(),
            os_family: node_class.image_family.clone(),
            os_disk_size_gb,
            os_disk_type,
            fips: node_class.kubelet_config.fips,
            max_pods: node_class.kubelet_config.max_pods,
            subnet_id: node_class.subnet_id.clone(),
            kubelet_config: node_class.kubelet_config.clone(),
            gpu_profile: None,
            agent_pool_mode: "User".into(),
        };
        let variation = CreateVariation { machine_name: name.clone(), zones: vec![chosen.offering.zone.clone()], tags: tags.clone() };
        let full_body = serde_json::json!({
            "machineName": name,
            "vmSize": template.vm_size,
            "zone": chosen.offering.zone,
            "capacityType": chosen.offering.capacity_type.as_str(),
            "tags": tags,
        });

        let provisional = Instance {
            name: name.clone(),
            provider_id: machine_provider_id("", &self.resource_group, &name),
            size: chosen.instance_type.name.clone(),
            zone: chosen.offering.zone.clone(),
            capacity_type: chosen.offering.capacity_type,
            image_reference: node_class.image_family.clone(),
            tags: tags.clone(),
            created_at: Utc::now(),
            subnet_id: node_class.subnet_id.clone(),
            encryption_at_host: Some(node_class.encryption_at_host),
            backend: Backend::Machine,
            node_name: None,
            kubelet_version: None,
            node_deleting: false,
            kubelet_identity_client_id: None,
            drift_action: None,
        };

        debug!(name = %name, sku = %chosen.instance_type.name, zone = %chosen.offering.zone, "submitting Machine create via batch grouper");
        self.grouper
            .submit(template, variation, full_body)
            .await
            .map_err(DriverError::Batch)?;

        Ok(Promise::PolledStatus(PolledStatusPromise {
            instance_name: name,
            resource_group: self.resource_group.clone(),
            agent_pool_name: self.agent_pool_name.clone(),
            client: self.client.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            resolved: None,
            provisional,
        }))
    }

    async fn get(&self, name: &str) -> Result<Instance, DriverError> {
        self.client.get(&self.resource_group, name).await
    }

    async fn list(&self) -> Result<Vec<Instance>, DriverError> {
        self.client.list(&self.resource_group, &self.agent_pool_name).await
    }

    async fn delete(&self, name: &str) -> Result<(), DriverError> {
        let names = [name.to_string()];
        self.client.delete_machines(&self.resource_group, &self.agent_pool_name, &names).await
    }
}

pub fn machine_provider_id(region: &str, resource_group: &str, instance_name: &str) -> ProviderId {
    ProviderId::new(format!("azure:///subscriptions/x/resourceGroups/{resource_group}/providers/Microsoft.ContainerService/managedClusters/x/machines/{instance_name}?region={region}"))
        .expect("non-empty provider id literal")
}

pub fn is_machine_backend_instance(instance: &Instance) -> bool {
    instance.backend == Backend::Machine
}
