//! Core error types for the taxonomy engine.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use thiserror::Error;

use crate::projection::ProjectionError;
use crate::taxonomies::{ApplyError, TaxonomyError};

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the taxonomy engine.
///
/// Business-rule rejections travel as `Taxonomy(..)`. `Replay(..)` and
/// `Projection(..)` mean a persisted event could not be folded, which is a
/// corrupted log or a logic bug and is never expected during normal operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Event replay failed: {0}")]
    Replay(#[from] ApplyError),

    #[error("Projection failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Returns the business rejection carried by this error, if any.
    pub fn as_taxonomy_error(&self) -> Option<&TaxonomyError> {
        match self {
            Error::Taxonomy(err) => Some(err),
            _ => None,
        }
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Another writer appended to the stream after we loaded it.
    #[error("Append conflict on '{aggregate_id}': expected version {expected}, found {actual}")]
    Conflict {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Database(DatabaseError::Internal(err.to_string()))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
