use std::sync::Arc;

use nclc_domain::{
    Backend, DriftReason, Instance, NodeClaim, NodeClass, ANNOTATION_HASH_VERSION,
    ANNOTATION_NODECLASS_HASH,
};
use tracing::debug;

use crate::error::DriftError;
use crate::nic::NicLookup;

/// Options for dimensions the detector can't resolve from domain types alone
/// (§6 "KubeletIdentityClientID").
#[derive(Debug, Clone, Default)]
pub struct DriftOptions {
    pub kubelet_identity_client_id: Option<String>,
    pub cluster_default_subnet_id: Option<String>,
}

/// Multi-dimension comparison of an observed [`Instance`] against its desired
/// [`NodeClass`] (C8). Dimensions are evaluated in the fixed order from §4.7;
/// the first non-empty reason wins and later dimensions are never consulted
/// (§8 P6). Every check is read-only (§4.7 "None of them mutate NodeClaim or
/// Instance state").
pub struct DriftDetector {
    nic_lookup: Arc<dyn NicLookup>,
    options: DriftOptions,
}

impl DriftDetector {
    pub fn new(nic_lookup: Arc<dyn NicLookup>, options: DriftOptions) -> Self {
        Self { nic_lookup, options }
    }

    /// Returns `Ok(Some(reason))` on drift, `Ok(None)` when none of the
    /// dimensions fired (including every soft-fail case from §8 P7), and
    /// `Err` only for genuine misconfiguration (§4.7.3, §4.7.4).
    pub async fn check(
        &self,
        node_claim: &NodeClaim,
        node_class: &NodeClass,
        instance: &Instance,
    ) -> Result<Option<DriftReason>, DriftError> {
        if let Some(reason) = self.check_static_fields(node_claim, node_class) {
            return Ok(Some(reason));
        }
        if let Some(reason) = self.check_k8s_version(node_class, instance) {
            return Ok(Some(reason));
        }
        if let Some(reason) = self.check_image(node_class, instance)? {
            return Ok(Some(reason));
        }
        if let Some(reason) = self.check_subnet(node_class, instance).await? {
            return Ok(Some(reason));
        }
        if let Some(reason) = self.check_kubelet_identity(instance) {
            return Ok(Some(reason));
        }
        if let Some(reason) = self.check_cluster_config(instance) {
            return Ok(Some(reason));
        }
        Ok(None)
    }

    /// §4.7.1: NodeClass content-hash annotation vs. current NodeClass hash.
    /// Hash-version mismatch is a soft "skip this check", not a drift signal.
    fn check_static_fields(&self, node_claim: &NodeClaim, node_class: &NodeClass) -> Option<DriftReason> {
        let stamped_hash = node_claim.annotations.get(ANNOTATION_NODECLASS_HASH)?;
        let stamped_version = node_claim.annotations.get(ANNOTATION_HASH_VERSION);
        let current_version = node_class.hash_version.as_ref();

        if stamped_version != current_version {
            debug!("nodeclass hash version mismatch, skipping static-field drift check");
            return None;
        }

        let current_hash = node_class.content_hash.as_ref()?;
        if stamped_hash != current_hash {
            return Some(DriftReason::NodeClassDrift);
        }
        None
    }

    /// §4.7.2. Soft-fails to no drift when the Node hasn't registered yet, is
    /// deleting, or the NodeClass carries no expected version (§8 P7).
    fn check_k8s_version(&self, node_class: &NodeClass, instance: &Instance) -> Option<DriftReason> {
        let expected = node_class.kubernetes_version.as_ref()?;
        let node_name = instance.node_name.as_ref()?;
        if instance.node_deleting {
            return None;
        }
        let observed = instance.kubelet_version.as_ref()?;
        let observed = observed.strip_prefix('v').unwrap_or(observed);
        let expected = expected.strip_prefix('v').unwrap_or(expected);
        debug!(node_name, observed, expected, "comparing kubelet version for drift");
        if observed != expected {
            Some(DriftReason::K8sVersionDrift)
        } else {
            None
        }
    }

    /// §4.7.3. `images_ready = false` is a soft "no drift, no error"; an
    /// empty allowed set while ready is a misconfiguration error.
    fn check_image(&self, node_class: &NodeClass, instance: &Instance) -> Result<Option<DriftReason>, DriftError> {
        if !node_class.images_ready {
            return Ok(None);
        }
        if node_class.allowed_image_ids.is_empty() {
            return Err(DriftError::EmptyAllowedImages(node_class.name.to_string()));
        }
        if node_class.allowed_image_ids.iter().any(|id| id == &instance.image_reference) {
            Ok(None)
        } else {
            Ok(Some(DriftReason::ImageVersionDrift))
        }
    }

    /// §4.7.4. Missing NIC is soft ("no drift"); a NIC with no subnet is an
    /// error, distinct from the soft case. No VNet-migration special case
    /// (§9 design note): a changed VNet segment reports as ordinary
    /// `SubnetDrift`.
    async fn check_subnet(&self, node_class: &NodeClass, instance: &Instance) -> Result<Option<DriftReason>, DriftError> {
        let expected = node_class
            .subnet_id
            .as_ref()
            .or(self.options.cluster_default_subnet_id.as_ref());
        let Some(expected) = expected else {
            return Ok(None);
        };

        let Some(observed) = self.nic_lookup.primary_nic_subnet(instance).await? else {
            return Ok(None);
        };

        if &observed != expected {
            Ok(Some(DriftReason::SubnetDrift))
        } else {
            Ok(None)
        }
    }

    /// §4.7.5, VM backend only. Missing label is soft "no drift".
    fn check_kubelet_identity(&self, instance: &Instance) -> Option<DriftReason> {
        if instance.backend != Backend::Vm {
            return None;
        }
        let expected = self.options.kubelet_identity_client_id.as_ref()?;
        let observed = instance.kubelet_identity_client_id.as_ref()?;
        if observed != expected {
            Some(DriftReason::KubeletIdentityDrift)
        } else {
            None
        }
    }

    /// §4.7.6, Machine backend only. The cloud itself sets `drift_action`;
    /// this check is a pure passthrough.
    fn check_cluster_config(&self, instance: &Instance) -> Option<DriftReason> {
        if instance.backend != Backend::Machine {
            return None;
        }
        match instance.drift_action.as_deref() {
            Some("Recreate") => Some(DriftReason::ClusterConfigDrift),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nic::StaticNicLookup;
    use chrono::Utc;
    use nclc_domain::{CapacityType, KubeletConfig, NodeClaimName, NodeClassName, OsDiskType, ProviderId, ReadyCondition};
    use std::collections::BTreeMap;

    fn base_node_class() -> NodeClass {
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

    fn base_claim() -> NodeClaim {
        let mut nc = NodeClaim::new(NodeClaimName::new("worker-1").unwrap(), nclc_domain::ResourceList::default());
        nc.annotations.insert(ANNOTATION_NODECLASS_HASH.to_string(), "h1".into());
        nc.annotations.insert(ANNOTATION_HASH_VERSION.to_string(), "v1".into());
        nc
    }

    fn base_instance() -> Instance {
        Instance {
            name: "aks-worker-1".into(),
            provider_id: ProviderId::new("x/aks-worker-1").unwrap(),
            size: "Standard_D2s_v3".into(),
            zone: "region-1".into(),
            capacity_type: CapacityType::OnDemand,
            image_reference: "img-1".into(),
            tags: BTreeMap::new(),
            created_at: Utc::now(),
            subnet_id: None,
            encryption_at_host: None,
            backend: Backend::Vm,
            node_name: Some("node-1".into()),
            kubelet_version: Some("v1.29.0".into()),
            node_deleting: false,
            kubelet_identity_client_id: None,
            drift_action: None,
        }
    }

    fn detector(subnet: Option<&str>) -> DriftDetector {
        DriftDetector::new(
            Arc::new(StaticNicLookup(subnet.map(str::to_string))),
            DriftOptions { kubelet_identity_client_id: None, cluster_default_subnet_id: None },
        )
    }

    #[tokio::test]
    async fn no_drift_when_everything_matches() {
        let d = detector(Some("subnet-1"));
        let result = d.check(&base_claim(), &base_node_class(), &base_instance()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn nodeclass_hash_mismatch_is_reported_first() {
        let d = detector(Some("definitely-not-subnet-1"));
        let mut node_class = base_node_class();
        node_class.content_hash = Some("h2".into());
        let mut instance = base_instance();
        instance.image_reference = "img-unknown".into();

        let result = d.check(&base_claim(), &node_class, &instance).await.unwrap();
        assert_eq!(result, Some(DriftReason::NodeClassDrift), "earlier dimension must win over later ones (P6)");
    }

    #[tokio::test]
    async fn hash_version_mismatch_skips_static_check_without_drift() {
        let d = detector(Some("subnet-1"));
        let mut node_class = base_node_class();
        node_class.hash_version = Some("v2".into());
        node_class.content_hash = Some("h-different".into());

        let result = d.check(&base_claim(), &node_class, &base_instance()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn k8s_version_drift_detected_after_stripping_v_prefix() {
        let d = detector(Some("subnet-1"));
        let mut instance = base_instance();
        instance.kubelet_version = Some("v1.28.0".into());
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, Some(DriftReason::K8sVersionDrift));
    }

    #[tokio::test]
    async fn soft_fail_when_node_name_unset() {
        let d = detector(Some("subnet-1"));
        let mut instance = base_instance();
        instance.node_name = None;
        instance.kubelet_version = Some("v1.28.0".into());
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, None, "P7: NodeName unset must soft-fail to no drift");
    }

    #[tokio::test]
    async fn soft_fail_when_node_deleting() {
        let d = detector(Some("subnet-1"));
        let mut instance = base_instance();
        instance.node_deleting = true;
        instance.kubelet_version = Some("v1.28.0".into());
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn image_drift_when_not_in_allowed_set() {
        let d = detector(Some("subnet-1"));
        let mut instance = base_instance();
        instance.image_reference = "img-stale".into();
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, Some(DriftReason::ImageVersionDrift));
    }

    #[tokio::test]
    async fn images_not_ready_soft_fails() {
        let d = detector(Some("subnet-1"));
        let mut node_class = base_node_class();
        node_class.images_ready = false;
        let mut instance = base_instance();
        instance.image_reference = "img-unknown".into();
        let result = d.check(&base_claim(), &node_class, &instance).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn empty_allowed_images_while_ready_is_an_error() {
        let d = detector(Some("subnet-1"));
        let mut node_class = base_node_class();
        node_class.allowed_image_ids = vec![];
        let err = d.check(&base_claim(), &node_class, &base_instance()).await.unwrap_err();
        assert!(matches!(err, DriftError::EmptyAllowedImages(_)));
    }

    #[tokio::test]
    async fn subnet_drift_when_nic_subnet_differs() {
        let d = detector(Some("subnet-2"));
        let result = d.check(&base_claim(), &base_node_class(), &base_instance()).await.unwrap();
        assert_eq!(result, Some(DriftReason::SubnetDrift));
    }

    #[tokio::test]
    async fn missing_nic_soft_fails() {
        let d = detector(None);
        let result = d.check(&base_claim(), &base_node_class(), &base_instance()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn kubelet_identity_drift_vm_backend_only() {
        let d = DriftDetector::new(
            Arc::new(StaticNicLookup(Some("subnet-1".into()))),
            DriftOptions { kubelet_identity_client_id: Some("expected-client-id".into()), cluster_default_subnet_id: None },
        );
        let mut instance = base_instance();
        instance.kubelet_identity_client_id = Some("other-client-id".into());
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, Some(DriftReason::KubeletIdentityDrift));
    }

    #[tokio::test]
    async fn cluster_config_drift_short_circuits_earlier_checks_need_not_apply() {
        let d = detector(Some("subnet-1"));
        let mut instance = base_instance();
        instance.backend = Backend::Machine;
        instance.drift_action = Some("Recreate".into());
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, Some(DriftReason::ClusterConfigDrift));
    }

    #[tokio::test]
    async fn machine_without_drift_action_has_no_cluster_config_drift() {
        let d = detector(Some("subnet-1"));
        let mut instance = base_instance();
        instance.backend = Backend::Machine;
        let result = d.check(&base_claim(), &base_node_class(), &instance).await.unwrap();
        assert_eq!(result, None);
    }
}
