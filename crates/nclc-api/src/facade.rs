use std::sync::Arc;

use async_trait::async_trait;
use nclc_catalog::InstanceTypeCatalog;
use nclc_domain::{DriftReason, Instance, NodeClaim, NodeClass, RepairPolicy};
use nclc_driver::DualBackendRouter;
use nclc_drift::DriftDetector;
use nclc_pipeline::{NodeClassResolver, ProvisioningPipeline};

use crate::error::ApiError;

/// The `CloudProvider` contract the upstream scheduler consumes (§6 "Upstream
/// scheduler interface"). `GetInstanceTypes` takes the already-resolved
/// [`NodeClass`] rather than a NodePool identifier — NodePool CRD resolution
/// is out of scope (§1) and happens upstream of this facade.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn create(&self, node_claim: &NodeClaim) -> Result<NodeClaim, ApiError>;
    async fn list(&self) -> Result<Vec<Instance>, ApiError>;
    async fn get(&self, provider_id: &str) -> Result<Instance, ApiError>;
    async fn delete(&self, node_claim: &NodeClaim) -> Result<(), ApiError>;
    async fn is_drifted(&self, node_claim: &NodeClaim) -> Result<Option<DriftReason>, ApiError>;
    fn get_instance_types(&self, node_class: &NodeClass) -> Result<Vec<nclc_domain::InstanceType>, ApiError>;
    fn repair_policies(&self) -> Vec<RepairPolicy>;
    fn name(&self) -> &'static str;
}

/// Default repair-policy set: tolerate `Ready=Unknown`/`Ready=False` for five
/// minutes before the upstream scheduler forcibly replaces the node, matching
/// the durations the teacher's driver layer uses for LRO backoffs elsewhere.
pub fn default_repair_policies() -> Vec<RepairPolicy> {
    vec![
        RepairPolicy { condition_type: "Ready".into(), condition_status: "False".into(), toleration_seconds: 300 },
        RepairPolicy { condition_type: "Ready".into(), condition_status: "Unknown".into(), toleration_seconds: 300 },
    ]
}

/// Wires every component (C1-C10) behind the single [`CloudProvider`]
/// surface the upstream scheduler talks to.
pub struct NclcCloudProvider {
    pipeline: Arc<ProvisioningPipeline>,
    router: Arc<DualBackendRouter>,
    drift_detector: Arc<DriftDetector>,
    resolver: Arc<dyn NodeClassResolver>,
    catalog: Arc<InstanceTypeCatalog>,
    cloud_name: &'static str,
}

impl NclcCloudProvider {
    pub fn new(
        pipeline: Arc<ProvisioningPipeline>,
        router: Arc<DualBackendRouter>,
        drift_detector: Arc<DriftDetector>,
        resolver: Arc<dyn NodeClassResolver>,
        catalog: Arc<InstanceTypeCatalog>,
        cloud_name: &'static str,
    ) -> Self {
        Self { pipeline, router, drift_detector, resolver, catalog, cloud_name }
    }
}

#[async_trait]
impl CloudProvider for NclcCloudProvider {
    async fn create(&self, node_claim: &NodeClaim) -> Result<NodeClaim, ApiError> {
        Ok(self.pipeline.create(node_claim).await?)
    }

    async fn list(&self) -> Result<Vec<Instance>, ApiError> {
        Ok(self.router.list().await?)
    }

    async fn get(&self, provider_id: &str) -> Result<Instance, ApiError> {
        Ok(self.router.get(provider_id).await?)
    }

    async fn delete(&self, node_claim: &NodeClaim) -> Result<(), ApiError> {
        Ok(self.router.delete(node_claim).await?)
    }

    async fn is_drifted(&self, node_claim: &NodeClaim) -> Result<Option<DriftReason>, ApiError> {
        let node_class_ref = node_claim
            .node_class_ref
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("NodeClaim has no nodeClassRef"))?;
        let node_class = self
            .resolver
            .resolve(node_class_ref)
            .await
            .ok_or_else(|| ApiError::not_found(format!("NodeClass {node_class_ref} not found")))?;
        let provider_id = node_claim
            .status
            .provider_id
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("NodeClaim has no providerID yet"))?;
        let instance = self.router.get(provider_id.as_str()).await?;
        Ok(self.drift_detector.check(node_claim, &node_class, &instance).await?)
    }

    fn get_instance_types(&self, node_class: &NodeClass) -> Result<Vec<nclc_domain::InstanceType>, ApiError> {
        Ok(self.catalog.list(node_class)?)
    }

    fn repair_policies(&self) -> Vec<RepairPolicy> {
        default_repair_policies()
    }

    fn name(&self) -> &'static str {
        self.cloud_name
    }
}
