use std::sync::Arc;
use std::time::Duration;

use nclc_domain::Instance;
use tracing::warn;

use crate::error::DriverError;
use crate::machine::{MachineApiClient, MachineStatus};
use crate::vm::{OperationHandle, PollOutcome, VmApiClient};

/// Default fixed polling interval for both `Promise` variants (§4.8 waiter
/// goroutine: "poll every 500 ms").
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Unifies the VM backend's per-operation poller URL and the Machine
/// backend's GET-based status polling behind one `Wait()`/`Cleanup()`
/// interface (§9 "Long-running-operation abstraction"). A third, trivial
/// variant represents the idempotent-reuse case where the instance already
/// exists and there is nothing to wait for.
pub enum Promise {
    Poller(PollerPromise),
    PolledStatus(PolledStatusPromise),
    Resolved(Instance),
}

impl Promise {
    pub async fn wait(&mut self) -> Result<Instance, DriverError> {
        match self {
            Promise::Poller(p) => p.wait().await,
            Promise::PolledStatus(p) => p.wait().await,
            Promise::Resolved(instance) => Ok(instance.clone()),
        }
    }

    /// Best-effort delete of whatever partial resources were created, only
    /// if `wait()` never reached a successful terminal state. The grouper/
    /// coordinator do not attempt to replay failed work (§4.4 "Crash
    /// safety") — cleanup is this promise's sole responsibility.
    pub async fn cleanup(&mut self) {
        match self {
            Promise::Poller(p) => p.cleanup().await,
            Promise::PolledStatus(p) => p.cleanup().await,
            Promise::Resolved(_) => {}
        }
    }

    pub fn instance_name(&self) -> &str {
        match self {
            Promise::Poller(p) => &p.instance_name,
            Promise::PolledStatus(p) => &p.instance_name,
            Promise::Resolved(instance) => &instance.name,
        }
    }

    /// The synthesized instance shape submitted to the cloud, before `Wait()`
    /// confirms it (§4.8 step 6: "build provisional NodeClaim from
    /// promise.VM + chosen InstanceType"). Already-resolved promises (the
    /// idempotent-reuse path) return the real, confirmed instance.
    pub fn provisional(&self) -> &Instance {
        match self {
            Promise::Poller(p) => &p.provisional,
            Promise::PolledStatus(p) => &p.provisional,
            Promise::Resolved(instance) => instance,
        }
    }
}

/// VM backend: polls the per-operation poller URL returned by `BeginCreate`.
pub struct PollerPromise {
    pub(crate) instance_name: String,
    pub(crate) resource_group: String,
    pub(crate) client: Arc<dyn VmApiClient>,
    pub(crate) operation: OperationHandle,
    pub(crate) poll_interval: Duration,
    pub(crate) resolved: Option<Instance>,
    pub(crate) provisional: Instance,
}

impl PollerPromise {
    async fn wait(&mut self) -> Result<Instance, DriverError> {
        if let Some(instance) = &self.resolved {
            return Ok(instance.clone());
        }
        loop {
            match self.client.poll_operation(&self.operation).await? {
                PollOutcome::Pending => tokio::time::sleep(self.poll_interval).await,
                PollOutcome::Succeeded(instance) => {
                    self.resolved = Some(instance.clone());
                    return Ok(instance);
                }
                PollOutcome::Failed { kind, message } => {
                    return Err(DriverError::ProvisionFailed {
                        kind,
                        message,
                        sku: self.provisional.size.clone(),
                        zone: self.provisional.zone.clone(),
                        capacity_type: self.provisional.capacity_type,
                    })
                }
            }
        }
    }

    async fn cleanup(&mut self) {
        if self.resolved.is_none() {
            if let Err(e) = self.client.delete(&self.resource_group, &self.instance_name).await {
                warn!(error = %e, name = %self.instance_name, "best-effort cleanup of partial VM create failed");
            }
        }
    }
}

/// Machine backend: the batched create call returns no per-machine poller,
/// so the promise polls the instance's status field directly via GET
/// (§4.5 "per-machine polling is done via a GET-based poller", §9 "the
/// batched variant polls the instance's status field on a fixed interval").
pub struct PolledStatusPromise {
    pub(crate) instance_name: String,
    pub(crate) resource_group: String,
    pub(crate) agent_pool_name: String,
    pub(crate) client: Arc<dyn MachineApiClient>,
    pub(crate) poll_interval: Duration,
    pub(crate) resolved: Option<Instance>,
    pub(crate) provisional: Instance,
}

impl PolledStatusPromise {
    async fn wait(&mut self) -> Result<Instance, DriverError> {
        if let Some(instance) = &self.resolved {
            return Ok(instance.clone());
        }
        loop {
            match self.client.get_status(&self.resource_group, &self.instance_name).await? {
                MachineStatus::Creating => tokio::time::sleep(self.poll_interval).await,
                MachineStatus::Succeeded(instance) => {
                    self.resolved = Some(instance.clone());
                    return Ok(instance);
                }
                MachineStatus::Failed { kind, message } => {
                    return Err(DriverError::ProvisionFailed {
                        kind,
                        message,
                        sku: self.provisional.size.clone(),
                        zone: self.provisional.zone.clone(),
                        capacity_type: self.provisional.capacity_type,
                    })
                }
            }
        }
    }

    async fn cleanup(&mut self) {
        if self.resolved.is_none() {
            let names = [self.instance_name.clone()];
            if let Err(e) = self
                .client
                .delete_machines(&self.resource_group, &self.agent_pool_name, &names)
                .await
            {
                warn!(error = %e, name = %self.instance_name, "best-effort cleanup of partial Machine create failed");
            }
        }
    }
}
