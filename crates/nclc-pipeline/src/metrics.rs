use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// `nodeclaims_disrupted_total{reason="async_provisioning"}` tagged by
/// node-pool and capacity-type (§7). A minimal counter abstraction — the
/// outer process is free to wire this to a real metrics backend; tests use
/// the in-memory implementation directly.
pub trait Metrics: Send + Sync {
    fn incr_disrupted(&self, reason: &str, node_pool: &str, capacity_type: &str);
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct DisruptedKey {
    reason: String,
    node_pool: String,
    capacity_type: String,
}

/// In-memory counter, process-wide for the lifetime of the controller
/// (§9 "Global mutable state" — injected, not a singleton; tests get a fresh
/// instance per case).
#[derive(Default)]
pub struct InMemoryMetrics {
    counts: Mutex<HashMap<DisruptedKey, u64>>,
    total: AtomicU64,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_disrupted(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn disrupted_count(&self, reason: &str, node_pool: &str, capacity_type: &str) -> u64 {
        let key = DisruptedKey { reason: reason.to_string(), node_pool: node_pool.to_string(), capacity_type: capacity_type.to_string() };
        *self.counts.lock().expect("metrics lock poisoned").get(&key).unwrap_or(&0)
    }
}

impl Metrics for InMemoryMetrics {
    fn incr_disrupted(&self, reason: &str, node_pool: &str, capacity_type: &str) {
        let key = DisruptedKey { reason: reason.to_string(), node_pool: node_pool.to_string(), capacity_type: capacity_type.to_string() };
        *self.counts.lock().expect("metrics lock poisoned").entry(key).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
    }
}
