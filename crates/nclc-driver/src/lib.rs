pub mod driver;
pub mod error;
pub mod local;
pub mod machine;
pub mod naming;
pub mod promise;
pub mod router;
pub mod selection;
pub mod vm;

pub use driver::{Nic, Provider};
pub use error::DriverError;
pub use local::LocalVmApiClient;
pub use machine::{machine_provider_id, is_machine_backend_instance, MachineApiClient, MachineBackend, MachineStatus};
pub use promise::{PolledStatusPromise, PollerPromise, Promise, DEFAULT_POLL_INTERVAL};
pub use router::DualBackendRouter;
pub use vm::{is_vm_backend_instance, vm_provider_id, OperationHandle, PollOutcome, VmApiClient, VmBackend};
