// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid worker state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
