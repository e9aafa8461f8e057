use async_trait::async_trait;
use nclc_domain::{NodeClaim, NodeClaimName, NodeClass, NodeClassName};

/// Resolves a [`NodeClass`] by name. An external collaborator (§1
/// "Deliberately out of scope: CustomResourceDefinition serialization and the
/// Kubernetes API server") — production wiring reads the cluster's NodeClass
/// CRDs; tests supply a fixed in-memory map.
#[async_trait]
pub trait NodeClassResolver: Send + Sync {
    async fn resolve(&self, name: &NodeClassName) -> Option<NodeClass>;
}

/// The NodeClaim record store this system mutates (§3 "mutated only by this
/// system", §6 "Persisted state"). Another external collaborator — the real
/// implementation talks to the Kubernetes API server; tests use an in-memory
/// map.
#[async_trait]
pub trait NodeClaimStore: Send + Sync {
    /// Best-effort delete; not-found is not an error (§4.8 waiter goroutine).
    async fn delete(&self, name: &NodeClaimName);

    /// Marks a NodeClaim as having reached the "Launched" condition — the
    /// waiter polls for this before calling `promise.wait()` to avoid racing
    /// the caller-side CRD write (§4.8).
    async fn mark_launched(&self, claim: &NodeClaim);

    async fn is_launched(&self, name: &NodeClaimName) -> bool;
}

/// Simple in-memory implementation of both collaborator traits, for tests and
/// for a standalone/demo deployment of the controller.
#[derive(Default)]
pub struct InMemoryNodeClaimStore {
    launched: std::sync::Mutex<std::collections::HashSet<String>>,
    deleted: std::sync::Mutex<Vec<String>>,
}

impl InMemoryNodeClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl NodeClaimStore for InMemoryNodeClaimStore {
    async fn delete(&self, name: &NodeClaimName) {
        self.launched.lock().expect("store lock poisoned").remove(name.as_str());
        self.deleted.lock().expect("store lock poisoned").push(name.as_str().to_string());
    }

    async fn mark_launched(&self, claim: &NodeClaim) {
        self.launched.lock().expect("store lock poisoned").insert(claim.name.as_str().to_string());
    }

    async fn is_launched(&self, name: &NodeClaimName) -> bool {
        self.launched.lock().expect("store lock poisoned").contains(name.as_str())
    }
}

#[derive(Default)]
pub struct InMemoryNodeClassResolver {
    classes: std::sync::Mutex<std::collections::HashMap<String, NodeClass>>,
}

impl InMemoryNodeClassResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, node_class: NodeClass) {
        self.classes.lock().expect("resolver lock poisoned").insert(node_class.name.as_str().to_string(), node_class);
    }
}

#[async_trait]
impl NodeClassResolver for InMemoryNodeClassResolver {
    async fn resolve(&self, name: &NodeClassName) -> Option<NodeClass> {
        self.classes.lock().expect("resolver lock poisoned").get(name.as_str()).cloned()
    }
}
