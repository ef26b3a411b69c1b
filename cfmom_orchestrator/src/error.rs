use thiserror::Error;

/// Failure reported by a proposer invocation. Non-fatal: the proposer is
/// recorded as failed for the wave and the run continues.
#[derive(Debug, Clone, Error)]
pub enum ProposerError {
    #[error("proposer failed: {0}")]
    Failed(String),

    #[error("proposer backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by an evidence store during verification.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Transient; verification is retried with backoff.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("store fault: {0}")]
    Fault(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}
