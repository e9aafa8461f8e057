use async_trait::async_trait;
use nclc_domain::Instance;

use crate::error::DriftError;

/// Reads the subnet of an instance's primary NIC from the cloud (§4.7.4).
/// An external collaborator (§1 "Deliberately out of scope: cloud SDK
/// clients") — production wiring calls through to the concrete backend's
/// `get_nic`; the Machine backend, which has no NIC concept of its own, can
/// supply a trivial "always absent" implementation.
#[async_trait]
pub trait NicLookup: Send + Sync {
    /// `Ok(None)` means "no NIC found" (soft — no drift signal, §4.7.4
    /// "Missing NIC → no drift"). A NIC that exists but carries no subnet is
    /// signaled via `DriftError::NicMissingSubnet` from the implementation,
    /// not via this return type.
    async fn primary_nic_subnet(&self, instance: &Instance) -> Result<Option<String>, DriftError>;
}

/// Test/fixture lookup returning a fixed subnet (or none) regardless of the instance.
pub struct StaticNicLookup(pub Option<String>);

#[async_trait]
impl NicLookup for StaticNicLookup {
    async fn primary_nic_subnet(&self, _instance: &Instance) -> Result<Option<String>, DriftError> {
        Ok(self.0.clone())
    }
}
