//! Self-exclusion error types.

use super::models::ExclusionType;
use thiserror::Error;

/// Self-exclusion errors
#[derive(Debug, Error)]
pub enum ExclusionError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No exclusion with this id for this user
    #[error("Self-exclusion {0} not found")]
    NotFound(i64),

    /// An equivalent record is already active (unique-constraint race
    /// included)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Extension attempted after the post-cooldown window closed
    #[error("The post-cooldown window has expired")]
    WindowExpired,

    /// Extension attempted while the cooldown is still running
    #[error("The cooldown is still active; extension is only possible during the post-cooldown window")]
    CooldownStillActive,

    /// Only limit records and cooldowns can be cancelled by the user
    #[error("A {} cannot be cancelled", .0.label())]
    NotCancellable(ExclusionType),

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A stored row failed to decode into the typed model
    #[error("Corrupt self-exclusion record: {0}")]
    InvalidRecord(String),
}

impl ExclusionError {
    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            ExclusionError::Database(_) | ExclusionError::InvalidRecord(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for exclusion operations
pub type ExclusionResult<T> = Result<T, ExclusionError>;
