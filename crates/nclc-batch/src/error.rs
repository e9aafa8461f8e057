use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BatchError {
    #[error("batch call failed: {0}")]
    CallFailed(String),

    #[error("request cancelled before batch dispatch")]
    Cancelled,

    #[error("caller deadline exceeded while queued for batching")]
    DeadlineExceeded,

    #[error("per-machine error: {0}")]
    PerMachine(String),
}
