//! Error types for storage operations.

use icenet_common::CommonError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store could not be reached or rejected the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Retry budget spent; carries the last failure
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },

    /// A statement that cannot be executed as built
    #[error("Invalid statement for {table}: {message}")]
    InvalidStatement { table: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Identifier(#[from] CommonError),
}

/// SQLSTATE classes that fail the same way every time: data exceptions,
/// integrity violations, syntax and access rule violations.
const DETERMINISTIC_SQLSTATE_CLASSES: &[&str] = &["22", "23", "42"];

impl StorageError {
    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::Database(e) => match e {
                sqlx::Error::Database(db) => !db
                    .code()
                    .is_some_and(|code| DETERMINISTIC_SQLSTATE_CLASSES.iter().any(|c| code.starts_with(*c))),
                sqlx::Error::Configuration(_)
                | sqlx::Error::ColumnNotFound(_)
                | sqlx::Error::ColumnIndexOutOfBounds { .. }
                | sqlx::Error::ColumnDecode { .. }
                | sqlx::Error::TypeNotFound { .. }
                | sqlx::Error::Decode(_)
                | sqlx::Error::Encode(_) => false,
                _ => true,
            },
            StorageError::RetriesExhausted { .. }
            | StorageError::InvalidStatement { .. }
            | StorageError::InvalidConfig(_)
            | StorageError::Identifier(_) => false,
        }
    }
}
