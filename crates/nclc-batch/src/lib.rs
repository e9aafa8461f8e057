pub mod coordinator;
pub mod error;
pub mod grouper;
pub mod types;

pub use coordinator::{BatchCoordinator, BatchCreateClient, BatchCreateResponse, DefaultBatchCoordinator};
pub use error::BatchError;
pub use grouper::{BatchGrouper, BatchGrouperConfig};
pub use types::{CreateOutcome, CreateRequest, CreateTemplate, CreateVariation, PendingBatch};
