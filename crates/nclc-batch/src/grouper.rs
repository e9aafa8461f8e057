use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{error, warn};

use crate::coordinator::BatchCoordinator;
use crate::error::BatchError;
use crate::types::{CreateOutcome, CreateRequest, CreateTemplate, CreateVariation, PendingBatch};

/// Tuning knobs for the grouper's await-quiescence window (§4.4).
#[derive(Debug, Clone)]
pub struct BatchGrouperConfig {
    pub idle_timeout: Duration,
    pub max_timeout: Duration,
    pub max_batch_size: usize,
    /// Kill switch. When `false`, `submit` bypasses grouping entirely and
    /// calls the coordinator with a batch-of-one.
    pub enabled: bool,
}

impl Default for BatchGrouperConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_millis(2000),
            max_batch_size: 50,
            enabled: true,
        }
    }
}

type BatchMap = HashMap<u64, PendingBatch>;

/// Coalesces concurrent `CreateTemplate`-identical requests into one cloud
/// call (C4). Cloned handles share the same pending-batch map and trigger, so
/// every clone enqueues into the same run loop.
#[derive(Clone)]
pub struct BatchGrouper {
    config: BatchGrouperConfig,
    batches: Arc<Mutex<BatchMap>>,
    trigger: Arc<Notify>,
    coordinator: Arc<dyn BatchCoordinator>,
}

impl BatchGrouper {
    /// Builds the grouper and, if batching is enabled, spawns its supervised
    /// run loop in the background.
    pub fn spawn(config: BatchGrouperConfig, coordinator: Arc<dyn BatchCoordinator>) -> Self {
        let batches: Arc<Mutex<BatchMap>> = Arc::new(Mutex::new(HashMap::new()));
        let trigger = Arc::new(Notify::new());
        let grouper = Self { config: config.clone(), batches: batches.clone(), trigger: trigger.clone(), coordinator: coordinator.clone() };

        if config.enabled {
            tokio::spawn(supervised_run_loop(config, batches, trigger, coordinator));
        }

        grouper
    }

    /// Enqueues one create request and awaits its outcome.
    ///
    /// When batching is disabled this skips the grouper entirely and talks
    /// to the coordinator directly (§4.4 "skip-batching opt-out").
    pub async fn submit(
        &self,
        template: CreateTemplate,
        variation: CreateVariation,
        full_body: serde_json::Value,
    ) -> Result<CreateOutcome, BatchError> {
        if !self.config.enabled {
            let (req, rx) = CreateRequest::new(template.clone(), variation, full_body);
            let batch = PendingBatch { template, requests: vec![req] };
            self.coordinator.execute_batch(batch).await;
            return rx.await.map_err(|_| BatchError::Cancelled)?;
        }

        let (req, rx) = CreateRequest::new(template, variation, full_body);
        self.enqueue(req);
        rx.await.map_err(|_| BatchError::Cancelled)?
    }

    fn enqueue(&self, req: CreateRequest) {
        let mut guard = self.batches.lock().expect("batch map lock poisoned");
        let hash = req.template.template_hash();
        let entry = guard
            .entry(hash)
            .or_insert_with(|| PendingBatch { template: req.template.clone(), requests: Vec::new() });
        entry.requests.push(req);
        drop(guard);
        self.trigger.notify_one();
    }
}

/// Runs the inner loop under a restart supervisor: a panic inside one
/// iteration logs and restarts rather than silently stopping all future
/// batching for the process (§4.4 "wrapped in a panic handler").
async fn supervised_run_loop(
    config: BatchGrouperConfig,
    batches: Arc<Mutex<BatchMap>>,
    trigger: Arc<Notify>,
    coordinator: Arc<dyn BatchCoordinator>,
) {
    loop {
        let cfg = config.clone();
        let b = batches.clone();
        let t = trigger.clone();
        let c = coordinator.clone();

        let handle = tokio::spawn(async move { run_loop(cfg, b, t, c).await });

        match handle.await {
            Ok(()) => break,
            Err(join_err) if join_err.is_panic() => {
                error!("batch grouper run loop panicked, restarting");
                continue;
            }
            Err(_) => break, // task cancelled, e.g. on shutdown
        }
    }
}

/// `run_loop` never returns except by panicking — it is always restarted by
/// [`supervised_run_loop`] otherwise.
async fn run_loop(
    config: BatchGrouperConfig,
    batches: Arc<Mutex<BatchMap>>,
    trigger: Arc<Notify>,
    coordinator: Arc<dyn BatchCoordinator>,
) -> () {
    loop {
        trigger.notified().await;

        // await-quiescence: keep extending the idle window on every further
        // signal until either timer fires or a batch hits max size.
        let window_start = Instant::now();
        let max_deadline = window_start + config.max_timeout;
        loop {
            let idle_deadline = Instant::now() + config.idle_timeout;
            let at_cap = {
                let guard = batches.lock().expect("batch map lock poisoned");
                guard.values().any(|b| b.len() >= config.max_batch_size)
            };
            if at_cap {
                break;
            }

            tokio::select! {
                _ = sleep_until(idle_deadline) => break,
                _ = sleep_until(max_deadline) => break,
                _ = trigger.notified() => continue,
            }
        }

        let ready: Vec<PendingBatch> = {
            let mut guard = batches.lock().expect("batch map lock poisoned");
            std::mem::take(&mut *guard).into_values().collect()
        };

        for batch in ready {
            if batch.is_empty() {
                continue;
            }
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.execute_batch(batch).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nclc_domain::{CapacityType, OsDiskType};
    use std::collections::BTreeMap as Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_template() -> CreateTemplate {
        CreateTemplate {
            vm_size: "Standard_D2s_v3".into(),
            capacity_type: CapacityType::OnDemand,
            orchestrator_version: "1.29.0".into(),
            os_family: "Ubuntu".into(),
            os_disk_size_gb: 128,
            os_disk_type: OsDiskType::Managed,
            fips: false,
            max_pods: None,
            subnet_id: None,
            kubelet_config: Default::default(),
            gpu_profile: None,
            agent_pool_mode: "User".into(),
        }
    }

    fn sample_variation(name: &str) -> CreateVariation {
        CreateVariation { machine_name: name.into(), zones: vec!["1".into()], tags: Map::new() }
    }

    struct CountingCoordinator {
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl CountingCoordinator {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), batch_sizes: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl BatchCoordinator for CountingCoordinator {
        async fn execute_batch(&self, batch: PendingBatch) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(batch.len());
            let batch_id = uuid::Uuid::new_v4();
            for req in batch.requests {
                let name = req.machine_name().to_string();
                req.resolve(Ok(CreateOutcome { machine_name: name, batch_id }));
            }
        }
    }

    #[tokio::test]
    async fn concurrent_same_template_requests_coalesce_into_one_batch() {
        let coordinator = Arc::new(CountingCoordinator::new());
        let config = BatchGrouperConfig {
            idle_timeout: Duration::from_millis(20),
            max_timeout: Duration::from_millis(500),
            max_batch_size: 50,
            enabled: true,
        };
        let grouper = BatchGrouper::spawn(config, coordinator.clone());

        let mut handles = Vec::new();
        for i in 0..5 {
            let grouper = grouper.clone();
            let name = format!("node-{i}");
            handles.push(tokio::spawn(async move {
                grouper.submit(sample_template(), sample_variation(&name), serde_json::json!({})).await
            }));
        }

        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.batch_sizes.lock().unwrap().as_slice(), &[5]);
    }

    #[tokio::test]
    async fn disabled_grouper_dispatches_immediately_without_batching() {
        let coordinator = Arc::new(CountingCoordinator::new());
        let config = BatchGrouperConfig { enabled: false, ..Default::default() };
        let grouper = BatchGrouper::spawn(config, coordinator.clone());

        let outcome = grouper
            .submit(sample_template(), sample_variation("solo"), serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(outcome.machine_name, "solo");
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.batch_sizes.lock().unwrap().as_slice(), &[1]);
    }

    #[tokio::test]
    async fn different_templates_form_separate_batches() {
        let coordinator = Arc::new(CountingCoordinator::new());
        let config = BatchGrouperConfig {
            idle_timeout: Duration::from_millis(20),
            max_timeout: Duration::from_millis(500),
            max_batch_size: 50,
            enabled: true,
        };
        let grouper = BatchGrouper::spawn(config, coordinator.clone());

        let mut other = sample_template();
        other.vm_size = "Standard_D4s_v3".into();

        let a = grouper.submit(sample_template(), sample_variation("a"), serde_json::json!({}));
        let b = grouper.submit(other, sample_variation("b"), serde_json::json!({}));
        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 2);
    }
}
