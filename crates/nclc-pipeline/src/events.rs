use chrono::{DateTime, Utc};
use nclc_domain::NodeClaimName;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Structured reason-code events raised against a NodeClaim (§7 "User-visible
/// behavior"), grounded in the same tagged-enum-per-lifecycle-event shape the
/// teacher uses for its audit trail, adapted to this domain's reason codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum NodeClaimEvent {
    NodeClaimFailedToResolveNodeClass { at: DateTime<Utc>, node_claim: NodeClaimName, message: String },
    NodePoolFailedToResolveNodeClass { at: DateTime<Utc>, node_pool: String, message: String },
    NodeClaimFailedToRegister { at: DateTime<Utc>, node_claim: NodeClaimName, message: String },
    AsyncProvisioningDisrupted { at: DateTime<Utc>, node_claim: NodeClaimName, node_pool: Option<String>, message: String },
}

/// Where event emission goes. Default production implementation logs via
/// `tracing`; tests use an in-memory recorder to assert on emitted events.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: NodeClaimEvent);
}

/// Logs every event at `info!`/`warn!` depending on severity, matching the
/// ambient logging convention (§"Logging": lifecycle transitions at `info!`).
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, event: NodeClaimEvent) {
        match &event {
            NodeClaimEvent::NodeClaimFailedToResolveNodeClass { node_claim, message, .. } => {
                warn!(node_claim = %node_claim, message, "NodeClaimFailedToResolveNodeClass");
            }
            NodeClaimEvent::NodePoolFailedToResolveNodeClass { node_pool, message, .. } => {
                warn!(node_pool, message, "NodePoolFailedToResolveNodeClass");
            }
            NodeClaimEvent::NodeClaimFailedToRegister { node_claim, message, .. } => {
                warn!(node_claim = %node_claim, message, "NodeClaimFailedToRegister");
            }
            NodeClaimEvent::AsyncProvisioningDisrupted { node_claim, node_pool, message, .. } => {
                info!(node_claim = %node_claim, node_pool, message, "async provisioning disrupted");
            }
        }
    }
}

/// In-memory recorder for tests — collects every event in arrival order.
#[derive(Default)]
pub struct InMemoryEventRecorder {
    events: std::sync::Mutex<Vec<NodeClaimEvent>>,
}

impl InMemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NodeClaimEvent> {
        self.events.lock().expect("event recorder lock poisoned").clone()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn record(&self, event: NodeClaimEvent) {
        self.events.lock().expect("event recorder lock poisoned").push(event);
    }
}
