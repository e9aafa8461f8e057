use nclc_cache::OfferingCache;
use nclc_domain::{InstanceType, NodeClaim, NodeClass, Offering, OsDiskType};

use crate::error::DriverError;

/// The (type, offering) pair `begin_create` ultimately submits to the cloud.
#[derive(Debug, Clone)]
pub struct ChosenOffering {
    pub instance_type: InstanceType,
    pub offering: Offering,
}

/// §4.6 ephemeral-disk policy: when the NodeClass explicitly asks for an
/// ephemeral disk, drop any candidate type that can't provide one of at
/// least the requested size rather than silently falling back to managed.
pub fn eligible_types_for_disk_policy(instance_types: &[InstanceType], node_class: &NodeClass) -> Vec<InstanceType> {
    let ephemeral_requested = matches!(node_class.os_disk_type, OsDiskType::Ephemeral);
    if !ephemeral_requested {
        return instance_types.to_vec();
    }
    instance_types
        .iter()
        .filter(|t| t.ephemeral_disk_max_gb.is_some_and(|max| max >= node_class.os_disk_size_gb))
        .cloned()
        .collect()
}

/// Resolve the concrete disk configuration for a chosen candidate type.
pub fn resolve_os_disk(node_class: &NodeClass, candidate: &InstanceType) -> (OsDiskType, u32) {
    let size = node_class.os_disk_size_gb;
    match candidate.ephemeral_disk_max_gb {
        Some(max) if max >= size => (OsDiskType::Ephemeral, size),
        _ => (OsDiskType::Managed, size),
    }
}

/// Pick the cheapest available offering across the filtered instance types,
/// tie-broken by SKU name then zone then capacity-type for a total order
/// (§4.6 "lowest price, then deterministic by SKU name"). Re-checks the
/// offering cache at selection time — `instance_types` may have been
/// filtered moments earlier and an offering can flip unavailable in between.
pub fn select_offering(
    instance_types: &[InstanceType],
    node_claim: &NodeClaim,
    cache: &OfferingCache,
) -> Result<ChosenOffering, DriverError> {
    let mut candidates: Vec<(InstanceType, Offering)> = Vec::new();
    for t in instance_types {
        for o in &t.offerings {
            if let Some(req) = node_claim.zone_requirement() {
                if !req.is_satisfied_by(Some(&o.zone)) {
                    continue;
                }
            }
            if let Some(req) = node_claim.capacity_type_requirement() {
                if !req.is_satisfied_by(Some(o.capacity_type.as_str())) {
                    continue;
                }
            }
            if let Some(req) = node_claim.instance_type_requirement() {
                if !req.is_satisfied_by(Some(&t.name)) {
                    continue;
                }
            }
            candidates.push((t.clone(), o.clone()));
        }
    }

    candidates.sort_by(|(ta, oa), (tb, ob)| {
        oa.price
            .partial_cmp(&ob.price)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ta.name.cmp(&tb.name))
            .then_with(|| oa.zone.cmp(&ob.zone))
            .then_with(|| oa.capacity_type.as_str().cmp(ob.capacity_type.as_str()))
    });

    for (instance_type, offering) in candidates {
        if !cache.is_unavailable(&offering.sku, &offering.zone, offering.capacity_type) {
            return Ok(ChosenOffering { instance_type, offering });
        }
    }

    Err(DriverError::InsufficientCapacity(
        "no available offering among filtered instance types".into(),
    ))
}
