use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use nclc_domain::CapacityType;
use tracing::debug;

/// Default TTL for an unavailable-offering entry (§4.1: "3-5 minutes recommended").
pub const DEFAULT_TTL: Duration = Duration::from_secs(180);

/// One `(sku, zone, capacity-type)` cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OfferingKey {
    sku: String,
    zone: String,
    capacity_type: CapacityType,
}

/// `(sku, zone, capacity-type) → (reason, expires-at)` (§3 OfferingCacheEntry).
#[derive(Debug, Clone)]
struct Entry {
    reason: String,
    expires_at: Instant,
}

/// TTL map of `(SKU, zone, capacity-type) → unavailable-reason` (C1).
///
/// Lifecycle = controller lifetime; tests replace it with a per-test instance
/// rather than treating it as a process-wide singleton (§9 "Global mutable
/// state"). Any number of concurrent readers/writers; inserts never fail;
/// expiration is lazy (checked on read, never proactively swept).
pub struct OfferingCache {
    ttl: Duration,
    entries: RwLock<HashMap<OfferingKey, Entry>>,
}

impl OfferingCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Insert or overwrite `(sku, zone, capacity_type)` with a fresh TTL deadline.
    /// Inserts never fail (§4.1 "write-through-with-TTL").
    pub fn mark_unavailable(
        &self,
        reason: impl Into<String>,
        sku: &str,
        zone: &str,
        capacity_type: CapacityType,
    ) {
        let key = OfferingKey { sku: sku.to_string(), zone: zone.to_string(), capacity_type };
        let reason = reason.into();
        debug!(sku, zone, %capacity_type, reason = %reason, "marking offering unavailable");
        let mut guard = self.entries.write().expect("offering cache lock poisoned");
        guard.insert(key, Entry { reason, expires_at: Instant::now() + self.ttl });
    }

    /// True iff an unexpired entry exists for this triple, or for `(sku, "*",
    /// capacity_type)` — the all-zones wildcard `SkuNotAvailable` writes
    /// (§4.3 SKUNotAvailable, §8 P4: "block SKU in all zones").
    pub fn is_unavailable(&self, sku: &str, zone: &str, capacity_type: CapacityType) -> bool {
        self.lookup(sku, zone, capacity_type).is_some()
    }

    /// The blocking reason, if any unexpired entry exists for this triple or
    /// its `"*"`-zone wildcard.
    pub fn unavailable_reason(&self, sku: &str, zone: &str, capacity_type: CapacityType) -> Option<String> {
        self.lookup(sku, zone, capacity_type).map(|e| e.reason)
    }

    fn lookup(&self, sku: &str, zone: &str, capacity_type: CapacityType) -> Option<Entry> {
        let guard = self.entries.read().expect("offering cache lock poisoned");
        let now = Instant::now();
        let key = OfferingKey { sku: sku.to_string(), zone: zone.to_string(), capacity_type };
        if let Some(e) = guard.get(&key).filter(|e| e.expires_at > now) {
            return Some(e.clone());
        }
        if zone != "*" {
            let wildcard = OfferingKey { sku: sku.to_string(), zone: "*".to_string(), capacity_type };
            if let Some(e) = guard.get(&wildcard).filter(|e| e.expires_at > now) {
                return Some(e.clone());
            }
        }
        None
    }

    /// Remove every entry, expired or not. Used by tests and explicit admin action
    /// (the `POST /admin/cache/flush` route in `nclc-api`).
    pub fn flush(&self) {
        let mut guard = self.entries.write().expect("offering cache lock poisoned");
        let n = guard.len();
        guard.clear();
        debug!(entries_removed = n, "offering cache flushed");
    }

    /// Number of entries currently stored, expired or not — for status/diagnostics.
    pub fn len(&self) -> usize {
        self.entries.read().expect("offering cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OfferingCache {
    fn default() -> Self {
        Self::new()
    }
}
