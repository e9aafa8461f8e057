use std::sync::Arc;

use nclc_domain::{Instance, NodeClaim, ANNOTATION_MACHINE_RESOURCE_ID};

use crate::driver::Provider;
use crate::error::DriverError;
use crate::naming::is_machine_backend_name;

/// Front-door for list/get/delete across the two provisioning backends (C10).
///
/// Dispatches purely on the opaque providerID / NodeClaim annotations — it
/// never needs to know *why* a given instance lives on one backend or the
/// other, only how to tell which backend owns it (§4.9, §9 "Dynamic
/// dispatch").
pub struct DualBackendRouter {
    vm: Arc<dyn Provider>,
    machine: Arc<dyn Provider>,
    /// §6 `ManageExistingAKSMachines`: when VM mode is active, whether to also
    /// list Machine-backend instances left over from a migration.
    manage_existing_machines: bool,
    /// Administrative disable of the VM backend (e.g. fully migrated to Machine API).
    vm_backend_disabled: bool,
    /// Administrative disable of the Machine backend.
    machine_backend_disabled: bool,
}

impl DualBackendRouter {
    pub fn new(vm: Arc<dyn Provider>, machine: Arc<dyn Provider>) -> Self {
        Self { vm, machine, manage_existing_machines: false, vm_backend_disabled: false, machine_backend_disabled: false }
    }

    pub fn with_manage_existing_machines(mut self, enabled: bool) -> Self {
        self.manage_existing_machines = enabled;
        self
    }

    pub fn with_vm_backend_disabled(mut self, disabled: bool) -> Self {
        self.vm_backend_disabled = disabled;
        self
    }

    pub fn with_machine_backend_disabled(mut self, disabled: bool) -> Self {
        self.machine_backend_disabled = disabled;
        self
    }

    /// Query both backends concurrently and concatenate results. If either
    /// queried backend fails, the whole call fails (§4.9 "List").
    pub async fn list(&self) -> Result<Vec<Instance>, DriverError> {
        let query_vm = !self.vm_backend_disabled;
        let query_machine = !self.machine_backend_disabled || self.manage_existing_machines;

        let (vm_result, machine_result) = tokio::join!(
            async {
                if query_vm { self.vm.list().await } else { Ok(Vec::new()) }
            },
            async {
                if query_machine { self.machine.list().await } else { Ok(Vec::new()) }
            },
        );

        let mut out = vm_result?;
        out.extend(machine_result?);
        Ok(out)
    }

    /// Parse the providerID's trailing name segment to decide which backend
    /// to try first, then fall through on not-found during the migration
    /// window where a name is ambiguous (§4.9 "Get").
    pub async fn get(&self, provider_id: &str) -> Result<Instance, DriverError> {
        let name = trailing_name_segment(provider_id);

        if is_machine_backend_name(name) {
            match self.machine.get(name).await {
                Ok(i) => return Ok(i),
                Err(DriverError::NotFound(_)) if !self.vm_backend_disabled => {
                    return self.vm.get(name).await;
                }
                Err(e) => return Err(e),
            }
        }

        self.vm.get(name).await
    }

    /// Decide by inspecting the NodeClaim's own annotations — a
    /// machine-resource-id annotation picks the Machine backend, otherwise VM
    /// backend (§4.9 "Delete").
    pub async fn delete(&self, node_claim: &NodeClaim) -> Result<(), DriverError> {
        let name = node_claim
            .status
            .provider_id
            .as_ref()
            .map(|p| trailing_name_segment(p.as_str()).to_string())
            .unwrap_or_else(|| node_claim.name.as_str().to_string());

        if node_claim.annotations.contains_key(ANNOTATION_MACHINE_RESOURCE_ID) {
            self.machine.delete(&name).await
        } else {
            self.vm.delete(&name).await
        }
    }
}

fn trailing_name_segment(provider_id: &str) -> &str {
    provider_id.split('?').next().unwrap_or(provider_id).rsplit('/').next().unwrap_or(provider_id)
}
