use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid node claim name: {0}")]
    InvalidNodeClaimName(String),

    #[error("invalid node class name: {0}")]
    InvalidNodeClassName(String),

    #[error("invalid requirement operator: {0}")]
    InvalidOperator(String),

    #[error("invalid capacity type: {0}")]
    InvalidCapacityType(String),

    #[error("invalid provider id: {0}")]
    InvalidProviderId(String),

    #[error("reserved tag key '{0}' may not be overridden by user tags")]
    ReservedTagKey(String),
}
