use blobs_types::{ContextError, Digest};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No committed record exists for the digest.
    #[error("blob not found: {0}")]
    NotFound(Digest),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transactional index failed (poisoned lock, lost reservation).
    #[error("transaction failed: {0}")]
    Txn(String),

    /// The backend does not offer this capability.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// The caller's context was cancelled or ran past its deadline.
    #[error("interrupted: {0}")]
    Interrupted(#[from] ContextError),

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// True for the "record not found" sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
