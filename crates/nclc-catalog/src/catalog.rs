use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use nclc_cache::OfferingCache;
use nclc_domain::{CapacityType, InstanceType, NodeClass};
use tracing::{debug, warn};

use crate::error::CatalogError;

/// Default slower-cadence refresh interval for the SKU enumeration (§4.2:
/// "refreshed on a slower cadence (implementation-defined)").
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Abstraction over the cloud's SKU enumeration API — an external collaborator
/// (§1 "Deliberately out of scope: cloud SDK clients"). Production wiring
/// supplies an implementation backed by the cloud SDK; tests supply a fixed
/// in-memory list.
#[async_trait]
pub trait SkuSource: Send + Sync {
    /// Enumerate every SKU the cloud supports, with raw (un-filtered) offerings.
    /// The `available` field on each offering is ignored by the catalog — it is
    /// recomputed from the [`OfferingCache`] on every [`InstanceTypeCatalog::list`].
    async fn list_skus(&self) -> Result<Vec<InstanceType>, CatalogError>;
}

/// Enumerates the SKUs the cloud supports, annotated with live offering
/// availability (C2). The catalog itself refreshes on a slower cadence than
/// any single provisioning attempt and tolerates refresh failures by serving
/// the last-known-good snapshot (§4.2).
pub struct InstanceTypeCatalog {
    source: Arc<dyn SkuSource>,
    cache: Arc<OfferingCache>,
    last_known_good: RwLock<Option<Vec<InstanceType>>>,
}

impl InstanceTypeCatalog {
    pub fn new(source: Arc<dyn SkuSource>, cache: Arc<OfferingCache>) -> Self {
        Self { source, cache, last_known_good: RwLock::new(None) }
    }

    /// Refresh the underlying SKU snapshot from the cloud. On failure the
    /// previous snapshot (if any) is retained and the error is only logged —
    /// callers of [`Self::list`] never observe a refresh failure directly.
    pub async fn refresh(&self) -> Result<(), CatalogError> {
        match self.source.list_skus().await {
            Ok(skus) => {
                debug!(count = skus.len(), "instance type catalog refreshed");
                *self.last_known_good.write().expect("catalog lock poisoned") = Some(skus);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "instance type catalog refresh failed, serving stale data");
                Err(e)
            }
        }
    }

    /// Spawn a background task that calls [`Self::refresh`] on `interval`,
    /// forever, logging (never panicking) on failure. Mirrors the teacher's
    /// single-background-task refresh convention (§5 "Shared resources").
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let _ = self.refresh().await;
            }
        })
    }

    /// List all instance types for `node_class`, each offering's `available`
    /// flag recomputed from the offering cache (§4.2). `node_class` is
    /// accepted per the public contract but this layer performs no
    /// requirement/resource filtering — that is C9's job (§4.2 "Filtering for
    /// a specific NodeClaim (done in C9, not C2)").
    pub fn list(&self, _node_class: &NodeClass) -> Result<Vec<InstanceType>, CatalogError> {
        let guard = self.last_known_good.read().expect("catalog lock poisoned");
        let base = guard.as_ref().ok_or(CatalogError::NeverPopulated)?;
        Ok(base.iter().cloned().map(|t| self.with_live_offerings(t)).collect())
    }

    fn with_live_offerings(&self, mut instance_type: InstanceType) -> InstanceType {
        for offering in &mut instance_type.offerings {
            let blocked = self.cache.is_unavailable(&offering.sku, &offering.zone, offering.capacity_type);
            offering.available = !blocked;
        }
        instance_type
    }

    /// Readiness signal the outer process exposes (§4.2 `LivenessProbe`).
    pub fn liveness_probe(&self) -> Result<(), CatalogError> {
        if self.last_known_good.read().expect("catalog lock poisoned").is_some() {
            Ok(())
        } else {
            Err(CatalogError::NeverPopulated)
        }
    }
}

/// Test/fixture [`SkuSource`] backed by a fixed in-memory list.
pub struct StaticSkuSource(pub Vec<InstanceType>);

#[async_trait]
impl SkuSource for StaticSkuSource {
    async fn list_skus(&self) -> Result<Vec<InstanceType>, CatalogError> {
        Ok(self.0.clone())
    }
}

/// `available` is recomputed unconditionally; `capacity_type` on the offering
/// does not need to match anything else to flip independently of its sibling.
pub fn any_available(instance_type: &InstanceType, capacity_type: Option<CapacityType>) -> bool {
    instance_type
        .offerings
        .iter()
        .any(|o| o.available && capacity_type.is_none_or(|ct| ct == o.capacity_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nclc_domain::{CapacityType, Offering, ResourceList};
    use std::collections::BTreeMap;

    fn sample_type(name: &str, family: &str, vcpus: u32) -> InstanceType {
        InstanceType {
            name: name.to_string(),
            family: family.to_string(),
            vcpus,
            requirement_values: BTreeMap::new(),
            offerings: vec![
                Offering { sku: name.to_string(), zone: "region-1".into(), capacity_type: CapacityType::Spot, price: 1.0, available: true },
                Offering { sku: name.to_string(), zone: "region-1".into(), capacity_type: CapacityType::OnDemand, price: 4.0, available: true },
            ],
            capacity: ResourceList::new(vcpus as i64 * 1000, 4 * 1024 * 1024 * 1024, 0),
            allocatable: ResourceList::new(vcpus as i64 * 1000 - 100, 4 * 1024 * 1024 * 1024, 0),
            ephemeral_disk_max_gb: None,
        }
    }

    fn dummy_node_class() -> NodeClass {
        use nclc_domain::{KubeletConfig, NodeClassName, OsDiskType, ReadyCondition};
        NodeClass {
            name: NodeClassName::new("default").unwrap(),
            image_family: "ubuntu".into(),
            os_disk_size_gb: 128,
            os_disk_type: OsDiskType::Managed,
            kubelet_config: KubeletConfig::default(),
            subnet_id: None,
            tags: BTreeMap::new(),
            encryption_at_host: false,
            content_hash: None,
            hash_version: None,
            ready: ReadyCondition::True,
            kubernetes_version: Some("1.29.0".into()),
            images_ready: true,
            allowed_image_ids: vec!["img-1".into()],
            deletion_timestamp: None,
        }
    }

    #[tokio::test]
    async fn list_reflects_cache_blocking() {
        let cache = Arc::new(OfferingCache::new());
        let source = Arc::new(StaticSkuSource(vec![sample_type("Standard_D2s_v3", "Dv3", 2)]));
        let catalog = InstanceTypeCatalog::new(source, cache.clone());
        catalog.refresh().await.unwrap();

        let types = catalog.list(&dummy_node_class()).unwrap();
        assert!(types[0].has_available_offering());

        cache.mark_unavailable("x", "Standard_D2s_v3", "region-1", CapacityType::Spot);
        cache.mark_unavailable("x", "Standard_D2s_v3", "region-1", CapacityType::OnDemand);
        let types = catalog.list(&dummy_node_class()).unwrap();
        assert!(!types[0].has_available_offering());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_known_good() {
        struct FlakySource(std::sync::atomic::AtomicBool);
        #[async_trait]
        impl SkuSource for FlakySource {
            async fn list_skus(&self) -> Result<Vec<InstanceType>, CatalogError> {
                if self.0.swap(false, std::sync::atomic::Ordering::SeqCst) {
                    Ok(vec![sample_type("Standard_D2s_v3", "Dv3", 2)])
                } else {
                    Err(CatalogError::SourceUnavailable("boom".into()))
                }
            }
        }

        let cache = Arc::new(OfferingCache::new());
        let source = Arc::new(FlakySource(std::sync::atomic::AtomicBool::new(true)));
        let catalog = InstanceTypeCatalog::new(source, cache);
        catalog.refresh().await.unwrap();
        assert!(catalog.refresh().await.is_err());
        assert_eq!(catalog.list(&dummy_node_class()).unwrap().len(), 1);
    }

    #[test]
    fn liveness_probe_fails_until_first_refresh() {
        let cache = Arc::new(OfferingCache::new());
        let source = Arc::new(StaticSkuSource(vec![]));
        let catalog = InstanceTypeCatalog::new(source, cache);
        assert!(catalog.liveness_probe().is_err());
    }
}
