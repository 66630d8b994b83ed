//! Storage error types and the transient/permanent classification the
//! job controller and pipeline stages rely on.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the storage gateway.
///
/// Per §7's taxonomy, failures split into two buckets: *transient*
/// (connection reset, deadlock, serialization failure — caller may retry)
/// and *permanent* (constraint violation other than conflict-ignore,
/// schema mismatch, not-found — caller must fail the job).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("transaction conflict, retry: {0}")]
    SerializationFailure(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True when the caller may retry the same logical operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Connection(_) | StorageError::SerializationFailure(_) => true,
            StorageError::Query(e) => is_retryable_sqlx_error(e),
            StorageError::NotFound(_)
            | StorageError::ConstraintViolation(_)
            | StorageError::Migration(_) => false,
        }
    }
}

fn is_retryable_sqlx_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Postgres class 40 (transaction rollback) and 08 (connection
            // exception) are transient; everything else is treated as
            // permanent for this gateway's purposes.
            db_err
                .code()
                .map(|code| code.starts_with("40") || code.starts_with("08"))
                .unwrap_or(false)
        }
        _ => false,
    }
}
