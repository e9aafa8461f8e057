use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::BatchError;
use crate::types::{CreateOutcome, PendingBatch};

/// Raw response shape from one batched create call (§4.5.3): either a
/// batch-level error or a per-machine error map.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateResponse {
    pub global_error: Option<String>,
    /// machine name → error message, for machines the cloud rejected individually.
    pub per_machine_errors: BTreeMap<String, String>,
}

/// The cloud API surface the coordinator consumes (§1 "Deliberately out of
/// scope: cloud SDK clients") — a single call that encodes the shared
/// template in the body and per-request variations in an out-of-band header.
#[async_trait]
pub trait BatchCreateClient: Send + Sync {
    async fn batch_create(
        &self,
        header: serde_json::Value,
        template_body: serde_json::Value,
        per_machine_bodies: Vec<serde_json::Value>,
    ) -> Result<BatchCreateResponse, BatchError>;
}

/// Executes one [`PendingBatch`] and fans results to each request's response
/// channel (C5).
#[async_trait]
pub trait BatchCoordinator: Send + Sync {
    async fn execute_batch(&self, batch: PendingBatch);
}

/// Default coordinator: one `batch_create` call per batch, fanning results
/// out per §4.5 step 4.
pub struct DefaultBatchCoordinator {
    client: Arc<dyn BatchCreateClient>,
}

impl DefaultBatchCoordinator {
    pub fn new(client: Arc<dyn BatchCreateClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BatchCoordinator for DefaultBatchCoordinator {
    async fn execute_batch(&self, batch: PendingBatch) {
        let batch_id = Uuid::new_v4();
        let header: Vec<serde_json::Value> = batch
            .requests
            .iter()
            .map(|r| {
                serde_json::json!({
                    "machineName": r.machine_name(),
                    "zones": r.variation.zones,
                    "tags": r.variation.tags,
                })
            })
            .collect();
        let template_body = serde_json::json!({
            "vmSize": batch.template.vm_size,
            "capacityType": batch.template.capacity_type,
        });
        let per_machine_bodies: Vec<serde_json::Value> =
            batch.requests.iter().map(|r| r.full_body.clone()).collect();

        debug!(
            batch_id = %batch_id,
            size = batch.requests.len(),
            vm_size = %batch.template.vm_size,
            "dispatching batch create",
        );

        match self.client.batch_create(serde_json::json!(header), template_body, per_machine_bodies).await {
            Ok(resp) if resp.per_machine_errors.is_empty() && resp.global_error.is_some() => {
                // No per-machine detail at all — the whole call failed (§4.5.4).
                let msg = resp.global_error.unwrap();
                for req in batch.requests {
                    req.resolve(Err(BatchError::CallFailed(msg.clone())));
                }
            }
            Ok(resp) => {
                for req in batch.requests {
                    let name = req.machine_name().to_string();
                    match resp.per_machine_errors.get(&name) {
                        Some(err) => req.resolve(Err(BatchError::PerMachine(err.clone()))),
                        None => req.resolve(Ok(CreateOutcome { machine_name: name, batch_id })),
                    }
                }
            }
            Err(e) => {
                for req in batch.requests {
                    req.resolve(Err(e.clone()));
                }
            }
        }
    }
}
