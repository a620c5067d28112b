//! Storage-specific error types for SQLite operations.
//!
//! Diesel and r2d2 failures are wrapped here and converted to the
//! database-agnostic errors of `taxonomist_core` at the crate boundary.

use diesel::result::Error as DieselError;
use thiserror::Error;
use taxonomist_core::errors::{DatabaseError, Error};

/// Storage-specific errors that wrap Diesel and r2d2 types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A core error raised inside a write job. Carried unchanged so that
    /// callers still see e.g. an append `Conflict` after the rollback.
    #[error("{0}")]
    Core(Error),
}

impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        StorageError::Core(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::PoolError(e) => {
                Error::Database(DatabaseError::PoolCreationFailed(e.to_string()))
            }
            StorageError::QueryFailed(DieselError::NotFound) => {
                Error::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            StorageError::QueryFailed(DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            )) => Error::Database(DatabaseError::UniqueViolation(info.message().to_string())),
            StorageError::QueryFailed(e) => {
                Error::Database(DatabaseError::QueryFailed(e.to_string()))
            }
            StorageError::MigrationFailed(e) => Error::Database(DatabaseError::MigrationFailed(e)),
            StorageError::SerializationError(e) => Error::Database(DatabaseError::Internal(e)),
            StorageError::Core(e) => e,
        }
    }
}

/// Extension trait for converting Diesel and r2d2 results to core results.
///
/// `From<DieselError> for Error` would break the orphan rule, so the
/// conversion goes through `StorageError`.
pub trait IntoCore<T> {
    fn into_core(self) -> taxonomist_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> taxonomist_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> taxonomist_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_database_not_found() {
        let err: Error = StorageError::QueryFailed(DieselError::NotFound).into();
        assert!(matches!(err, Error::Database(DatabaseError::NotFound(_))));
    }

    #[test]
    fn test_core_error_survives_round_trip() {
        let conflict = Error::Database(DatabaseError::Conflict {
            aggregate_id: "D1.T1.1.0".to_string(),
            expected: 1,
            actual: 2,
        });
        let err: Error = StorageError::from(conflict).into();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_into_core_on_diesel_result() {
        let result: std::result::Result<(), DieselError> = Err(DieselError::RollbackTransaction);
        let err = result.into_core().unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::QueryFailed(_))));
    }
}
