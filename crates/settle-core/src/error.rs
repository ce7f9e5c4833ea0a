use thiserror::Error;

/// Failure branch of an [`Operation`](crate::Operation).
///
/// The scheduler never propagates these; it only cares that the operation
/// settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("operation failed: {0}")]
    Failed(String),

    /// The resolver was dropped before settling the operation.
    #[error("operation abandoned before it settled")]
    Abandoned,
}

impl OperationError {
    pub fn failed(msg: impl Into<String>) -> Self {
        OperationError::Failed(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scheduler config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stall threshold of {0} ms is out of range")]
    InvalidThreshold(u64),
}
