use async_trait::async_trait;
use nclc_domain::{Instance, InstanceType, NodeClaim, NodeClass};

use crate::error::DriverError;
use crate::promise::Promise;

/// A network interface read, as returned by `get_nic` (VM backend only).
#[derive(Debug, Clone)]
pub struct Nic {
    pub name: String,
    pub subnet_id: Option<String>,
}

/// The contract both backends implement (§4.6 C6/C7).
#[async_trait]
pub trait Provider: Send + Sync {
    async fn begin_create(
        &self,
        node_class: &NodeClass,
        node_claim: &NodeClaim,
        instance_types: &[InstanceType],
    ) -> Result<Promise, DriverError>;

    async fn get(&self, name: &str) -> Result<Instance, DriverError>;

    async fn list(&self) -> Result<Vec<Instance>, DriverError>;

    async fn delete(&self, name: &str) -> Result<(), DriverError>;

    /// VM backend only; the Machine backend never reads NICs directly.
    async fn get_nic(&self, _resource_group: &str, _nic_name: &str) -> Result<Nic, DriverError> {
        Err(DriverError::fatal("get_nic is not supported by this backend"))
    }
}
