//! Error types shared by the common building blocks.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while validating shared configuration values.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid SQL identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },
}
