//! Engine error types

use thiserror::Error;

/// Errors surfaced by the detection engine entry points.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Transaction rejected before any write occurred.
    #[error("invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },

    /// Persistence layer failure, propagated unchanged.
    #[error("store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn invalid_transaction(id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidTransaction {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
