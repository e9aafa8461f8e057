use thiserror::Error;

/// Error taxonomy (§7) as surfaced by the provisioning pipeline to the
/// upstream scheduler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("node class not ready: {0}")]
    NodeClassNotReady(String),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("create failed ({reason}): {message}")]
    CreateError { reason: String, message: String },

    #[error("drift check failed: {0}")]
    Drift(#[from] nclc_drift::DriftError),

    #[error("catalog error: {0}")]
    Catalog(#[from] nclc_catalog::CatalogError),

    #[error(transparent)]
    Driver(#[from] nclc_driver::DriverError),
}

impl PipelineError {
    /// Maps a [`nclc_driver::DriverError`] onto the pipeline's narrower
    /// taxonomy, following the "On transient cloud error" / "On fatal" split
    /// in §4.10's failure-semantics table.
    pub fn from_driver(e: nclc_driver::DriverError) -> Self {
        use nclc_driver::DriverError;
        match e {
            DriverError::NotFound(m) => PipelineError::CreateError { reason: "NotFound".into(), message: m },
            DriverError::InsufficientCapacity(m) => PipelineError::InsufficientCapacity(m),
            DriverError::NodeClassNotReady(m) => PipelineError::NodeClassNotReady(m),
            DriverError::CreateError { reason, message } => PipelineError::CreateError { reason, message },
            DriverError::Transient(m) => PipelineError::CreateError { reason: "Transient".into(), message: m },
            DriverError::Fatal(m) => PipelineError::CreateError { reason: "Fatal".into(), message: m },
            DriverError::Batch(e) => PipelineError::CreateError { reason: "Batch".into(), message: e.to_string() },
            DriverError::Http(m) => PipelineError::CreateError { reason: "Http".into(), message: m },
            DriverError::ProvisionFailed { kind, message, .. } => {
                PipelineError::CreateError { reason: format!("{kind:?}"), message }
            }
        }
    }

    /// Like [`Self::from_driver`], but for a failure surfaced from
    /// `Promise::wait()`: classifies the cloud error via C3 first, feeding the
    /// Offering Cache (§4.10 "BeginCreate / Promise.Wait … classify via C3;
    /// update cache", §8 P4/S7), then converts to the pipeline's narrower
    /// taxonomy using the classifier's disposition rather than guessing from
    /// the error alone.
    pub fn from_promise_failure(
        e: nclc_driver::DriverError,
        classifier: &nclc_catalog::ErrorClassifier,
        all_types: &[nclc_domain::InstanceType],
    ) -> Self {
        if let nclc_driver::DriverError::ProvisionFailed { kind, message, sku, zone, capacity_type } = &e {
            let classification = classifier.classify(*kind, sku, zone, *capacity_type, all_types);
            return if classification.insufficient_capacity {
                PipelineError::InsufficientCapacity(message.clone())
            } else {
                PipelineError::CreateError { reason: format!("{kind:?}"), message: message.clone() }
            };
        }
        Self::from_driver(e)
    }
}
