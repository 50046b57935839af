//! Lock coordinator error types.

use thiserror::Error;

/// Lock coordinator errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock store error
    #[error("Lock store error: {0}")]
    Store(#[from] redis::RedisError),

    /// All acquisition attempts were exhausted while the resource was held
    /// by another worker. Transient; the caller may retry.
    #[error("Timed out acquiring lock on '{resource}' after {attempts} attempts")]
    Timeout { resource: String, attempts: u32 },
}

impl LockError {
    /// Get a client-safe error message that doesn't leak store details
    pub fn client_message(&self) -> String {
        match self {
            LockError::Store(_) => "Internal server error".to_string(),
            LockError::Timeout { .. } => {
                "The operation is busy, please retry shortly".to_string()
            }
        }
    }
}

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;
