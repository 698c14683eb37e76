//! Common error types for qcapp

use thiserror::Error;

/// Common result type for qcapp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the rating service and ingestion CLI
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected by a uniqueness constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid user input or stored value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map a unique-constraint violation to [`Error::Conflict`], anything else to `Database`
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Error::Conflict(format!("{} already exists", what))
            }
            other => Error::Database(other),
        }
    }
}
