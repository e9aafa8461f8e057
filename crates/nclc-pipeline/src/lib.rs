pub mod collaborators;
pub mod error;
pub mod events;
pub mod metrics;
pub mod pipeline;

pub use collaborators::{InMemoryNodeClaimStore, InMemoryNodeClassResolver, NodeClaimStore, NodeClassResolver};
pub use error::PipelineError;
pub use events::{EventRecorder, InMemoryEventRecorder, NodeClaimEvent, TracingEventRecorder};
pub use metrics::{InMemoryMetrics, Metrics};
pub use pipeline::{ProvisioningPipeline, LAUNCHED_POLL_INTERVAL};
