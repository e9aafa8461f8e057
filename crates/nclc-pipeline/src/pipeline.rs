use std::sync::Arc;
use std::time::Duration;

use nclc_catalog::{ErrorClassifier, InstanceTypeCatalog};
use nclc_domain::{
    Instance, InstanceType, NodeClaim, NodeClaimStatus, ReadyCondition, ANNOTATION_HASH_VERSION,
    ANNOTATION_INPLACE_UPDATE_HASH, ANNOTATION_NODECLASS_HASH, LABEL_CAPACITY_TYPE,
    LABEL_INSTANCE_TYPE, LABEL_NODEPOOL, LABEL_ZONE,
};
use nclc_driver::Provider;
use tracing::{info, warn};

use crate::collaborators::{NodeClaimStore, NodeClassResolver};
use crate::error::PipelineError;
use crate::events::{EventRecorder, NodeClaimEvent};
use crate::metrics::Metrics;

/// Poll interval the waiter goroutine uses to check whether the caller-side
/// CRD write has landed before calling `promise.Wait()` (§4.8 "poll every
/// 500 ms; this avoids racing with the caller-side CRD write").
pub const LAUNCHED_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Orchestrates NodeClaim creation (C9): resolves the NodeClass, selects an
/// instance type from the live catalog, calls the backend, and either waits
/// synchronously (standalone NodeClaims) or spawns a waiter task (managed
/// NodeClaims) per §4.8.
pub struct ProvisioningPipeline {
    resolver: Arc<dyn NodeClassResolver>,
    catalog: Arc<InstanceTypeCatalog>,
    backend: Arc<dyn Provider>,
    store: Arc<dyn NodeClaimStore>,
    events: Arc<dyn EventRecorder>,
    metrics: Arc<dyn Metrics>,
    classifier: Arc<ErrorClassifier>,
}

impl ProvisioningPipeline {
    pub fn new(
        resolver: Arc<dyn NodeClassResolver>,
        catalog: Arc<InstanceTypeCatalog>,
        backend: Arc<dyn Provider>,
        store: Arc<dyn NodeClaimStore>,
        events: Arc<dyn EventRecorder>,
        metrics: Arc<dyn Metrics>,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self { resolver, catalog, backend, store, events, metrics, classifier }
    }

    /// §4.8 `Create`. Returns the provisional NodeClaim immediately for
    /// managed NodeClaims (the waiter task runs in the background); blocks
    /// until the instance is confirmed for standalone NodeClaims.
    pub async fn create(&self, node_claim: &NodeClaim) -> Result<NodeClaim, PipelineError> {
        let node_class_ref = node_claim.node_class_ref.as_ref().ok_or_else(|| {
            PipelineError::NodeClassNotReady("NodeClaim has no nodeClassRef".into())
        })?;

        let node_class = match self.resolver.resolve(node_class_ref).await {
            Some(nc) if !nc.is_deleting() => nc,
            _ => {
                self.events.record(NodeClaimEvent::NodeClaimFailedToResolveNodeClass {
                    at: now(),
                    node_claim: node_claim.name.clone(),
                    message: format!("NodeClass {node_class_ref} not found"),
                });
                return Err(PipelineError::NodeClassNotReady(format!(
                    "NodeClass {node_class_ref} not found or deleting"
                )));
            }
        };

        match node_class.ready {
            ReadyCondition::True => {}
            ReadyCondition::Unknown => {
                return Err(PipelineError::CreateError {
                    reason: "NodeClassReadyUnknown".into(),
                    message: format!("NodeClass {node_class_ref} readiness is unknown"),
                })
            }
            ReadyCondition::False => {
                self.events.record(NodeClaimEvent::NodePoolFailedToResolveNodeClass {
                    at: now(),
                    node_pool: node_claim
                        .labels
                        .get(LABEL_NODEPOOL)
                        .cloned()
                        .unwrap_or_else(|| "standalone".into()),
                    message: format!("NodeClass {node_class_ref} not ready"),
                });
                return Err(PipelineError::NodeClassNotReady(format!(
                    "NodeClass {node_class_ref} is not ready"
                )));
            }
        }

        let candidates = self.catalog.list(&node_class)?;
        let filtered: Vec<_> = candidates
            .into_iter()
            .filter(|t| t.satisfies_requirements(&node_claim.requirements))
            .filter(|t| t.has_available_offering())
            .filter(|t| node_claim.resources.fits_within(&t.allocatable))
            .collect();
        if filtered.is_empty() {
            return Err(PipelineError::InsufficientCapacity(
                "no instance type satisfies requirements, offerings, and resources".into(),
            ));
        }

        let mut promise = self
            .backend
            .begin_create(&node_class, node_claim, &filtered)
            .await
            .map_err(PipelineError::from_driver)?;

        let provisional_instance = promise.provisional().clone();

        if node_claim.is_standalone() {
            match promise.wait().await {
                Ok(instance) => {
                    let instance_type = find_instance_type(&filtered, &instance.size);
                    return Ok(build_provisional_node_claim(node_claim, &node_class, &instance, instance_type));
                }
                Err(e) => {
                    promise.cleanup().await;
                    return Err(PipelineError::from_promise_failure(e, &self.classifier, &filtered));
                }
            }
        }

        let instance_type = find_instance_type(&filtered, &provisional_instance.size).cloned();
        let built = build_provisional_node_claim(node_claim, &node_class, &provisional_instance, instance_type.as_ref());

        let node_pool = node_claim.labels.get(LABEL_NODEPOOL).cloned();
        let capacity_type = provisional_instance.capacity_type.as_str().to_string();
        let claim_name = node_claim.name.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let metrics = self.metrics.clone();
        let classifier = self.classifier.clone();

        tokio::spawn(async move {
            run_waiter(claim_name, node_pool, capacity_type, promise, store, events, metrics, classifier, filtered).await;
        });

        Ok(built)
    }
}

/// Finds the instance type the backend chose, by SKU name, among the
/// candidates the pipeline filtered for this claim (§4.8 step 6: "build
/// provisional NodeClaim from promise.VM + chosen InstanceType").
fn find_instance_type<'a>(types: &'a [InstanceType], sku: &str) -> Option<&'a InstanceType> {
    types.iter().find(|t| t.name == sku)
}

/// §4.8 "Waiter goroutine". Blocks until the caller-side CRD write is
/// observed (poll `is_launched` every 500 ms), then waits on the promise. On
/// failure: emit an event, best-effort cleanup, best-effort delete the
/// NodeClaim record, and bump the disruption counter. On success the
/// existing record stands and nothing further happens.
async fn run_waiter(
    node_claim_name: nclc_domain::NodeClaimName,
    node_pool: Option<String>,
    capacity_type: String,
    mut promise: nclc_driver::Promise,
    store: Arc<dyn NodeClaimStore>,
    events: Arc<dyn EventRecorder>,
    metrics: Arc<dyn Metrics>,
    classifier: Arc<ErrorClassifier>,
    instance_types: Vec<InstanceType>,
) {
    while !store.is_launched(&node_claim_name).await {
        tokio::time::sleep(LAUNCHED_POLL_INTERVAL).await;
    }

    match promise.wait().await {
        Ok(instance) => {
            info!(node_claim = %node_claim_name, instance = %instance.name, "async provisioning completed");
        }
        Err(e) => {
            warn!(node_claim = %node_claim_name, error = %e, "async provisioning disrupted");
            classify_and_update_cache(&classifier, &e, &instance_types);
            events.record(NodeClaimEvent::AsyncProvisioningDisrupted {
                at: now(),
                node_claim: node_claim_name.clone(),
                node_pool: node_pool.clone(),
                message: e.to_string(),
            });
            promise.cleanup().await;
            store.delete(&node_claim_name).await;
            metrics.incr_disrupted(
                "async_provisioning",
                node_pool.as_deref().unwrap_or("standalone"),
                &capacity_type,
            );
        }
    }
}

/// §4.10 "BeginCreate / Promise.Wait … classify via C3; update cache": feeds
/// a failed LRO's cloud error kind and failing offering triple to the error
/// classifier so the Offering Cache reflects it for the next scheduling
/// attempt (§8 P4/S7). A no-op for `DriverError` variants that never carry
/// that information (local selection failures, batch/HTTP plumbing errors).
fn classify_and_update_cache(classifier: &ErrorClassifier, err: &nclc_driver::DriverError, instance_types: &[InstanceType]) {
    if let nclc_driver::DriverError::ProvisionFailed { kind, sku, zone, capacity_type, .. } = err {
        classifier.classify(*kind, sku, zone, *capacity_type, instance_types);
    }
}

/// §4.8 step 6: synthesize the provisional NodeClaim from the promise's
/// (possibly still-pending) instance shape plus the chosen NodeClass,
/// stamping the well-known labels, status fields, and drift-tracking
/// annotations.
fn build_provisional_node_claim(
    node_claim: &NodeClaim,
    node_class: &nclc_domain::NodeClass,
    instance: &Instance,
    instance_type: Option<&InstanceType>,
) -> NodeClaim {
    let mut built = node_claim.clone();

    built.labels.insert(LABEL_CAPACITY_TYPE.to_string(), instance.capacity_type.as_str().to_string());
    built.labels.insert(LABEL_ZONE.to_string(), instance.zone.clone());
    built.labels.insert(LABEL_INSTANCE_TYPE.to_string(), instance.size.clone());

    built.status = NodeClaimStatus {
        provider_id: Some(instance.provider_id.clone()),
        image_id: Some(instance.image_reference.clone()),
        capacity: instance_type.map(|t| t.capacity.clone()),
        allocatable: instance_type.map(|t| t.allocatable.clone()),
    };

    if let Some(hash) = &node_class.content_hash {
        built.annotations.insert(ANNOTATION_NODECLASS_HASH.to_string(), hash.clone());
    }
    if let Some(version) = &node_class.hash_version {
        built.annotations.insert(ANNOTATION_HASH_VERSION.to_string(), version.clone());
    }
    built.annotations.insert(ANNOTATION_INPLACE_UPDATE_HASH.to_string(), node_class_inplace_hash(node_class));

    built
}

/// Distinct from the NodeClass content hash: this one covers only the fields
/// an in-place update (rather than a recreate) can reconcile, so it changes
/// independently of `ANNOTATION_NODECLASS_HASH`.
fn node_class_inplace_hash(node_class: &nclc_domain::NodeClass) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(node_class.kubelet_config.max_pods.unwrap_or(0).to_le_bytes());
    hasher.update([node_class.kubelet_config.fips as u8]);
    hasher.update(node_class.image_family.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryNodeClaimStore, InMemoryNodeClassResolver};
    use crate::events::InMemoryEventRecorder;
    use crate::metrics::InMemoryMetrics;
    use async_trait::async_trait;
    use nclc_cache::OfferingCache;
    use nclc_catalog::StaticSkuSource;
    use nclc_domain::{
        CapacityType, KubeletConfig, NodeClaimName, NodeClass, NodeClassName, Offering, OsDiskType,
        ProviderId, Requirement, ResourceList,
    };
    use nclc_driver::{DriverError, Nic, Promise};
    use std::collections::BTreeMap;

    fn node_class(ready: ReadyCondition) -> NodeClass {
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
            ready,
            kubernetes_version: Some("1.29.0".into()),
            images_ready: true,
            allowed_image_ids: vec!["img-1".into()],
            deletion_timestamp: None,
        }
    }

    fn instance_type(name: &str, zone: &str) -> nclc_domain::InstanceType {
        nclc_domain::InstanceType {
            name: name.to_string(),
            family: "Dv3".into(),
            vcpus: 2,
            requirement_values: BTreeMap::new(),
            offerings: vec![Offering { sku: name.to_string(), zone: zone.to_string(), capacity_type: CapacityType::OnDemand, price: 1.0, available: true }],
            capacity: ResourceList::new(2000, 4 * 1024 * 1024 * 1024, 0),
            allocatable: ResourceList::new(1900, 3 * 1024 * 1024 * 1024, 0),
            ephemeral_disk_max_gb: None,
        }
    }

    fn sample_instance(name: &str) -> Instance {
        Instance {
            name: name.to_string(),
            provider_id: ProviderId::new(format!("x/{name}")).unwrap(),
            size: "Standard_D2s_v3".into(),
            zone: "region-1".into(),
            capacity_type: CapacityType::OnDemand,
            image_reference: "img-1".into(),
            tags: BTreeMap::new(),
            created_at: chrono::Utc::now(),
            subnet_id: Some("subnet-1".into()),
            encryption_at_host: Some(false),
            backend: nclc_domain::Backend::Vm,
            node_name: None,
            kubelet_version: None,
            node_deleting: false,
            kubelet_identity_client_id: None,
            drift_action: None,
        }
    }

    struct FakeProvider {
        fail: bool,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn begin_create(
            &self,
            _node_class: &NodeClass,
            node_claim: &NodeClaim,
            instance_types: &[nclc_domain::InstanceType],
        ) -> Result<Promise, DriverError> {
            if self.fail {
                return Err(DriverError::CreateError { reason: "Boom".into(), message: "synthetic failure".into() });
            }
            let name = format!("aks-{}", node_claim.name);
            let mut instance = sample_instance(&name);
            instance.size = instance_types[0].name.clone();
            Ok(Promise::Resolved(instance))
        }

        async fn get(&self, name: &str) -> Result<Instance, DriverError> {
            Ok(sample_instance(name))
        }

        async fn list(&self) -> Result<Vec<Instance>, DriverError> {
            Ok(vec![])
        }

        async fn delete(&self, _name: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn get_nic(&self, _rg: &str, _nic: &str) -> Result<Nic, DriverError> {
            Err(DriverError::fatal("unsupported"))
        }
    }

    fn sample_claim(standalone: bool) -> NodeClaim {
        let mut nc = NodeClaim::new(NodeClaimName::new("worker-1").unwrap(), ResourceList::new(1000, 1024, 0));
        nc.node_class_ref = Some(NodeClassName::new("default").unwrap());
        nc.requirements.push(Requirement::in_values(LABEL_ZONE, vec!["region-1".to_string()]));
        if !standalone {
            nc.labels.insert(LABEL_NODEPOOL.to_string(), "pool-a".to_string());
        }
        nc
    }

    async fn refreshed_catalog() -> Arc<InstanceTypeCatalog> {
        let cache = Arc::new(OfferingCache::new());
        let source = Arc::new(StaticSkuSource(vec![instance_type("Standard_D2s_v3", "region-1")]));
        let catalog = Arc::new(InstanceTypeCatalog::new(source, cache));
        catalog.refresh().await.unwrap();
        catalog
    }

    #[tokio::test]
    async fn standalone_create_waits_synchronously_and_stamps_annotations() {
        let resolver = Arc::new(InMemoryNodeClassResolver::new());
        resolver.insert(node_class(ReadyCondition::True));
        let catalog = refreshed_catalog().await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(InMemoryNodeClaimStore::new());
        let backend = Arc::new(FakeProvider { fail: false });
        let classifier = Arc::new(ErrorClassifier::new(Arc::new(OfferingCache::new())));

        let pipeline = ProvisioningPipeline::new(resolver, catalog, backend, store, events, metrics, classifier);
        let claim = sample_claim(true);

        let built = pipeline.create(&claim).await.unwrap();
        assert_eq!(built.status.provider_id.unwrap().as_str(), "x/aks-worker-1");
        assert_eq!(built.annotations.get(ANNOTATION_NODECLASS_HASH).unwrap(), "h1");
        assert!(built.labels.contains_key(LABEL_ZONE));
    }

    #[tokio::test]
    async fn managed_create_spawns_waiter_and_returns_immediately() {
        let resolver = Arc::new(InMemoryNodeClassResolver::new());
        resolver.insert(node_class(ReadyCondition::True));
        let catalog = refreshed_catalog().await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(InMemoryNodeClaimStore::new());
        let backend = Arc::new(FakeProvider { fail: false });
        let classifier = Arc::new(ErrorClassifier::new(Arc::new(OfferingCache::new())));

        let pipeline = ProvisioningPipeline::new(resolver, catalog, backend, store, events, metrics, classifier);
        let claim = sample_claim(false);

        let built = pipeline.create(&claim).await.unwrap();
        assert!(built.status.provider_id.is_some());
    }

    #[tokio::test]
    async fn not_ready_node_class_is_rejected() {
        let resolver = Arc::new(InMemoryNodeClassResolver::new());
        resolver.insert(node_class(ReadyCondition::False));
        let catalog = refreshed_catalog().await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(InMemoryNodeClaimStore::new());
        let backend = Arc::new(FakeProvider { fail: false });
        let classifier = Arc::new(ErrorClassifier::new(Arc::new(OfferingCache::new())));

        let pipeline = ProvisioningPipeline::new(resolver, catalog, backend, store, events, metrics, classifier);
        let claim = sample_claim(true);

        let err = pipeline.create(&claim).await.unwrap_err();
        assert!(matches!(err, PipelineError::NodeClassNotReady(_)));
        assert_eq!(events.events().len(), 1);
    }

    #[tokio::test]
    async fn missing_node_class_emits_event_and_errors() {
        let resolver = Arc::new(InMemoryNodeClassResolver::new());
        let catalog = refreshed_catalog().await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(InMemoryNodeClaimStore::new());
        let backend = Arc::new(FakeProvider { fail: false });
        let classifier = Arc::new(ErrorClassifier::new(Arc::new(OfferingCache::new())));

        let pipeline = ProvisioningPipeline::new(resolver, catalog, backend, store, events.clone(), metrics, classifier);
        let claim = sample_claim(true);

        let err = pipeline.create(&claim).await.unwrap_err();
        assert!(matches!(err, PipelineError::NodeClassNotReady(_)));
        assert!(matches!(events.events()[0], NodeClaimEvent::NodeClaimFailedToResolveNodeClass { .. }));
    }

    #[tokio::test]
    async fn standalone_create_failure_propagates_and_cleans_up() {
        let resolver = Arc::new(InMemoryNodeClassResolver::new());
        resolver.insert(node_class(ReadyCondition::True));
        let catalog = refreshed_catalog().await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(InMemoryNodeClaimStore::new());
        let backend = Arc::new(FakeProvider { fail: true });
        let classifier = Arc::new(ErrorClassifier::new(Arc::new(OfferingCache::new())));

        let pipeline = ProvisioningPipeline::new(resolver, catalog, backend, store, events, metrics, classifier);
        let claim = sample_claim(true);

        let err = pipeline.create(&claim).await.unwrap_err();
        assert!(matches!(err, PipelineError::CreateError { .. }));
    }

    #[tokio::test]
    async fn waiter_success_path_leaves_record_untouched() {
        let claim_name = NodeClaimName::new("worker-2").unwrap();
        let store = Arc::new(InMemoryNodeClaimStore::new());
        store.mark_launched(&NodeClaim::new(claim_name.clone(), ResourceList::default())).await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());

        let classifier = Arc::new(ErrorClassifier::new(Arc::new(OfferingCache::new())));

        run_waiter(
            claim_name.clone(),
            Some("pool-a".into()),
            "on-demand".into(),
            Promise::Resolved(sample_instance("aks-worker-2")),
            store.clone(),
            events.clone(),
            metrics.clone(),
            classifier,
            vec![],
        )
        .await;

        assert!(events.events().is_empty());
        assert_eq!(metrics.total_disrupted(), 0);
        assert!(store.deleted_names().is_empty());
    }

    #[tokio::test]
    async fn waiter_disrupted_path_emits_event_cleans_up_and_increments_metric() {
        use async_trait::async_trait as at;
        use nclc_driver::{OperationHandle, PollOutcome, VmApiClient, VmBackend};

        struct FailingVmClient;

        #[at]
        impl VmApiClient for FailingVmClient {
            async fn begin_create_or_update(&self, _rg: &str, name: &str, _body: serde_json::Value) -> Result<OperationHandle, DriverError> {
                Ok(OperationHandle { operation_id: "op-1".into(), resource_name: name.to_string() })
            }

            async fn poll_operation(&self, _op: &OperationHandle) -> Result<PollOutcome, DriverError> {
                Ok(PollOutcome::Failed {
                    kind: nclc_domain::CloudErrorKind::LowPriorityCoresQuota,
                    message: "synthetic LRO failure".into(),
                })
            }

            async fn get(&self, _rg: &str, name: &str) -> Result<Instance, DriverError> {
                Err(DriverError::NotFound(name.to_string()))
            }

            async fn list(&self, _rg: &str) -> Result<Vec<Instance>, DriverError> {
                Ok(vec![])
            }

            async fn delete(&self, _rg: &str, _name: &str) -> Result<(), DriverError> {
                Ok(())
            }

            async fn get_nic(&self, _rg: &str, _nic: &str) -> Result<Nic, DriverError> {
                Err(DriverError::fatal("unsupported"))
            }
        }

        let cache = Arc::new(OfferingCache::new());
        let backend = VmBackend::new(Arc::new(FailingVmClient), cache.clone(), "rg".into(), "my-cluster".into());

        let mut claim = NodeClaim::new(NodeClaimName::new("worker-3").unwrap(), ResourceList::new(1000, 1024, 0));
        claim.labels.insert(LABEL_NODEPOOL.to_string(), "pool-a".to_string());
        claim.requirements.push(Requirement::in_values(LABEL_ZONE, vec!["region-1".to_string()]));

        let promise = backend
            .begin_create(&node_class(ReadyCondition::True), &claim, &[instance_type("Standard_D2s_v3", "region-1")])
            .await
            .unwrap();

        let store = Arc::new(InMemoryNodeClaimStore::new());
        store.mark_launched(&claim).await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let classifier = Arc::new(ErrorClassifier::new(cache.clone()));
        let instance_types = vec![instance_type("Standard_D2s_v3", "region-1")];

        run_waiter(
            claim.name.clone(),
            Some("pool-a".into()),
            "on-demand".into(),
            promise,
            store.clone(),
            events.clone(),
            metrics.clone(),
            classifier,
            instance_types,
        )
        .await;

        assert_eq!(events.events().len(), 1);
        assert!(matches!(events.events()[0], NodeClaimEvent::AsyncProvisioningDisrupted { .. }));
        assert_eq!(metrics.total_disrupted(), 1);
        assert_eq!(store.deleted_names(), vec!["worker-3".to_string()]);
        assert!(cache.is_unavailable("Standard_D2s_v3", "region-1", CapacityType::Spot));
    }
}
