use nclc_cache::OfferingCache;
use nclc_domain::{CapacityType, InstanceType};

/// Cloud error kinds the classifier maps (§4.3 table, left column). Defined
/// in `nclc-domain` so the driver layer can attach one to a failure without
/// depending on this crate; re-exported here under its original name.
pub use nclc_domain::CloudErrorKind;

/// What the upstream scheduler should do next, per §4.3's "Retry policy" column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    RetryOnDemand,
    RetryOtherZone,
    RetryOtherCapacityType,
    RetryOtherSku,
    NoRetry,
    RetryLater,
}

/// Outcome of classifying one create-time cloud error (§4.3, §7).
#[derive(Debug, Clone)]
pub struct Classification {
    pub retry: RetryPolicy,
    /// True ⇒ this is an unrecoverable/unknown error the caller should
    /// surface verbatim rather than treat as retryable capacity pressure.
    pub fatal: bool,
    /// True ⇒ surfaced to the upstream scheduler as "insufficient capacity"
    /// (§4.3, §7 "InsufficientCapacity").
    pub insufficient_capacity: bool,
}

/// Maps cloud error codes to cache actions and a retry/fatal classification (C3).
///
/// Injected as a component instance (not a singleton, §9 "Global mutable
/// state") so tests can supply a fresh [`OfferingCache`] per case.
pub struct ErrorClassifier {
    cache: std::sync::Arc<OfferingCache>,
}

impl ErrorClassifier {
    pub fn new(cache: std::sync::Arc<OfferingCache>) -> Self {
        Self { cache }
    }

    /// Classify `kind`, updating the offering cache as a side effect where the
    /// table calls for it, and return the retry/fatal disposition.
    ///
    /// `all_types` is needed only for `ZoneAllocationFailed`'s blast-radius
    /// blocking (§4.3, §8 P5): every SKU in the same family with vCPUs ≥ the
    /// failing SKU's vCPUs gets blocked in `zone`, both capacity types.
    pub fn classify(
        &self,
        kind: CloudErrorKind,
        sku: &str,
        zone: &str,
        capacity_type: CapacityType,
        all_types: &[InstanceType],
    ) -> Classification {
        use CloudErrorKind::*;
        match kind {
            LowPriorityCoresQuota => {
                self.cache.mark_unavailable("LowPriorityCoresQuota", sku, zone, CapacityType::Spot);
                Classification { retry: RetryPolicy::RetryOnDemand, fatal: false, insufficient_capacity: false }
            }
            OverconstrainedZonalAllocation => {
                self.cache.mark_unavailable("OverconstrainedZonalAllocation", sku, zone, capacity_type);
                Classification { retry: RetryPolicy::RetryOtherZone, fatal: false, insufficient_capacity: false }
            }
            OverconstrainedAllocation => {
                self.cache.mark_unavailable("OverconstrainedAllocation", sku, zone, capacity_type);
                Classification { retry: RetryPolicy::RetryOtherCapacityType, fatal: false, insufficient_capacity: false }
            }
            AllocationFailed => {
                self.cache.mark_unavailable("AllocationFailed", sku, zone, capacity_type);
                Classification { retry: RetryPolicy::RetryOtherSku, fatal: false, insufficient_capacity: false }
            }
            ZoneAllocationFailed => {
                self.block_zone_blast_radius(sku, zone, all_types);
                Classification { retry: RetryPolicy::RetryOtherZone, fatal: false, insufficient_capacity: false }
            }
            SkuNotAvailable => {
                self.cache.mark_unavailable("SKUNotAvailable", sku, "*", CapacityType::Spot);
                self.cache.mark_unavailable("SKUNotAvailable", sku, "*", CapacityType::OnDemand);
                Classification { retry: RetryPolicy::NoRetry, fatal: false, insufficient_capacity: true }
            }
            VmFamilyCoresQuotaExceeded => {
                Classification { retry: RetryPolicy::RetryLater, fatal: false, insufficient_capacity: false }
            }
            TotalRegionalCoresQuotaExceeded => {
                Classification { retry: RetryPolicy::NoRetry, fatal: true, insufficient_capacity: true }
            }
            NodeClassNotReady => {
                Classification { retry: RetryPolicy::NoRetry, fatal: true, insufficient_capacity: false }
            }
            Other => Classification { retry: RetryPolicy::NoRetry, fatal: true, insufficient_capacity: false },
        }
    }

    /// §4.3 ZoneAllocationFailed / §8 P5: block every SKU in the failing SKU's
    /// family with vCPUs ≥ its vCPU count, in `zone`, for both capacity types.
    ///
    /// Note: the cache key is keyed on zone "*" meaning "marked wildcard" is
    /// NOT used here — each concrete SKU name is marked individually in the
    /// concrete zone, matching how `is_unavailable` is queried per-SKU.
    fn block_zone_blast_radius(&self, failing_sku: &str, zone: &str, all_types: &[InstanceType]) {
        let Some(failing) = all_types.iter().find(|t| t.name == failing_sku) else {
            // Unknown SKU (not in the live catalog) — block only itself.
            self.cache.mark_unavailable("ZoneAllocationFailed", failing_sku, zone, CapacityType::Spot);
            self.cache.mark_unavailable("ZoneAllocationFailed", failing_sku, zone, CapacityType::OnDemand);
            return;
        };
        for t in all_types.iter().filter(|t| t.family == failing.family && t.vcpus >= failing.vcpus) {
            self.cache.mark_unavailable("ZoneAllocationFailed", &t.name, zone, CapacityType::Spot);
            self.cache.mark_unavailable("ZoneAllocationFailed", &t.name, zone, CapacityType::OnDemand);
        }
    }
}
