//! Custom error types for the common library
//!
//! This module defines the error type shared by every store adapter in the
//! workspace, whichever backend serves the data.

use sqlx::{Error as SqlxError, migrate::MigrateError};
use std::time::Duration;
use thiserror::Error;

/// Error raised by a persistent store (database, cache or in-memory backend)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error occurred while connecting to the store
    #[error("Store connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during query execution
    #[error("Store query error: {0}")]
    Query(#[source] SqlxError),

    /// The store did not answer within the configured bound
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Stored data could not be decoded
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    /// Configuration error
    #[error("Store configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Whether the error is a unique-constraint violation reported by Postgres
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Query(SqlxError::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        StoreError::Query(err)
    }
}

impl From<MigrateError> for StoreError {
    fn from(err: MigrateError) -> Self {
        StoreError::Migration(err.to_string())
    }
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failures_map_to_migration_error() {
        let err: StoreError = MigrateError::VersionMissing(20250101000000).into();

        assert!(matches!(err, StoreError::Migration(ref msg) if msg.contains("20250101000000")));
        assert!(err.to_string().starts_with("Database migration error"));
    }

    #[test]
    fn test_only_database_errors_are_unique_violations() {
        assert!(!StoreError::Query(SqlxError::RowNotFound).is_unique_violation());
        assert!(!StoreError::Timeout(Duration::from_secs(1)).is_unique_violation());
    }
}
