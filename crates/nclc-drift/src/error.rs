use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriftError {
    /// NodeClass images are ready but the allowed-image set is empty — a
    /// misconfiguration rather than an ordinary absence of drift (§4.7.3).
    #[error("NodeClass '{0}' has no allowed images despite images being ready")]
    EmptyAllowedImages(String),

    /// The NIC exists but carries no subnet — §4.7.4 calls this an error,
    /// distinct from a missing NIC (which is "no drift").
    #[error("NIC '{0}' has no subnet attached")]
    NicMissingSubnet(String),

    #[error("NIC lookup failed: {0}")]
    NicLookup(String),
}
