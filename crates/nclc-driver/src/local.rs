use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use nclc_domain::{Backend, CapacityType, Instance};
use tracing::debug;

use crate::driver::Nic;
use crate::error::DriverError;
use crate::vm::{OperationHandle, PollOutcome, VmApiClient};

/// A stand-in VM API client that performs no network I/O: creates resolve
/// immediately, `get`/`list`/`delete` operate over an in-memory map.
///
/// Production wiring of a real Azure Resource Manager client is out of
/// scope (`spec.md` §1, "cloud SDK clients"); this is the offline substitute
/// `nclc serve` uses when no such client is configured, the same role the
/// teacher's `LocalDriver` plays for enclave provisioning.
#[derive(Default)]
pub struct LocalVmApiClient {
    instances: Mutex<HashMap<String, Instance>>,
}

impl LocalVmApiClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VmApiClient for LocalVmApiClient {
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        body: serde_json::Value,
    ) -> Result<OperationHandle, DriverError> {
        debug!(resource_group, name, "LocalVmApiClient: begin_create_or_update");
        let size = body
            .get("properties")
            .and_then(|p| p.get("hardwareProfile"))
            .and_then(|h| h.get("vmSize"))
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string();

        let instance = Instance {
            name: name.to_string(),
            provider_id: crate::vm::vm_provider_id("local", resource_group, name),
            size,
            zone: "local-1".to_string(),
            capacity_type: CapacityType::OnDemand,
            image_reference: "local".to_string(),
            tags: Default::default(),
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
        self.instances.lock().unwrap().insert(name.to_string(), instance);

        Ok(OperationHandle { operation_id: format!("local-op-{name}"), resource_name: name.to_string() })
    }

    async fn poll_operation(&self, op: &OperationHandle) -> Result<PollOutcome, DriverError> {
        match self.instances.lock().unwrap().get(&op.resource_name) {
            Some(instance) => Ok(PollOutcome::Succeeded(instance.clone())),
            None => Ok(PollOutcome::Failed {
                kind: nclc_domain::CloudErrorKind::Other,
                message: "local instance vanished before poll".into(),
            }),
        }
    }

    async fn get(&self, _resource_group: &str, name: &str) -> Result<Instance, DriverError> {
        self.instances
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    async fn list(&self, _resource_group: &str) -> Result<Vec<Instance>, DriverError> {
        Ok(self.instances.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, _resource_group: &str, name: &str) -> Result<(), DriverError> {
        self.instances.lock().unwrap().remove(name);
        Ok(())
    }

    async fn get_nic(&self, _resource_group: &str, nic_name: &str) -> Result<Nic, DriverError> {
        Ok(Nic { name: nic_name.to_string(), subnet_id: None })
    }
}
