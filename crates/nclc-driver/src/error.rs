use nclc_domain::{CapacityType, CloudErrorKind};
use thiserror::Error;

/// Truncate a verbatim cloud error message to the length the error taxonomy
/// allows for fatal/unknown errors (§7: "≤ 1200 chars + ellipsis").
pub fn truncate_message(msg: &str) -> String {
    const LIMIT: usize = 1200;
    if msg.len() <= LIMIT {
        msg.to_string()
    } else {
        let mut truncated = msg.chars().take(LIMIT).collect::<String>();
        truncated.push('…');
        truncated
    }
}

/// Error taxonomy for the driver layer (§7). Kinds, not exhaustive types —
/// callers up the stack (`nclc-pipeline`) match on these to decide
/// cleanup/retry behavior rather than downcasting cloud-specific errors.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("node class not ready: {0}")]
    NodeClassNotReady(String),

    #[error("create failed ({reason}): {message}")]
    CreateError { reason: String, message: String },

    /// A create-time LRO failed with a cloud error the caller can classify
    /// (§4.3, §4.10 "BeginCreate / Promise.Wait … classify via C3; update
    /// cache"). Carries the `(sku, zone, capacity-type)` the failed attempt
    /// targeted alongside the cloud error kind, so `nclc-pipeline` can feed
    /// both to `ErrorClassifier` without re-deriving the chosen offering.
    #[error("provisioning failed ({kind:?}, sku={sku}, zone={zone}, capacity_type={capacity_type}): {message}")]
    ProvisionFailed {
        kind: CloudErrorKind,
        message: String,
        sku: String,
        zone: String,
        capacity_type: CapacityType,
    },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),

    #[error("batch error: {0}")]
    Batch(#[from] nclc_batch::BatchError),

    #[error("http error: {0}")]
    Http(String),
}

impl DriverError {
    /// Build a [`DriverError::Fatal`] with the message truncated per §7.
    pub fn fatal(msg: impl AsRef<str>) -> Self {
        DriverError::Fatal(truncate_message(msg.as_ref()))
    }
}
