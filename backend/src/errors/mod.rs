//! Global application error types and handlers.
//!
//! The persistence layers return richly contextualised errors (attempt counts,
//! database error codes). The service layer collapses them into
//! [`ServiceError`] before anything crosses the transport boundary.

use crate::utils::context::ContextError;
use thiserror::Error;

/// SQLite extended result codes that indicate a transient condition.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

/// Failure to establish the connection pool at startup.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid database url: {0}")]
    InvalidUrl(#[source] sqlx::Error),

    #[error("connection timeout after {attempts} attempt(s)")]
    Timeout {
        attempts: u32,
        #[source]
        last_error: Option<sqlx::Error>,
    },

    #[error("failed to connect to database after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Failure to hand out a healthy pooled connection.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("failed to acquire connection after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to find healthy connection after {attempts} attempt(s): {source}")]
    Unhealthy {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("connection acquisition interrupted: {0}")]
    Interrupted(#[from] ContextError),
}

/// A statement could not be assembled from its declared column set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatementError {
    #[error("empty column set for table {table}")]
    EmptyColumns { table: &'static str },

    #[error("column set for table {table} declares {columns} column(s) but {values} value(s) were supplied")]
    ColumnMismatch {
        table: &'static str,
        columns: usize,
        values: usize,
    },
}

/// Errors raised by the credential store repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to acquire healthy connection: {0}")]
    Acquire(#[from] AcquireError),

    #[error("failed to build query: {0}")]
    Build(#[from] StatementError),

    #[error("{operation} failed for {key}: database error {code}: {source}")]
    Database {
        operation: &'static str,
        key: String,
        code: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation} failed for {key}: {source}")]
    Query {
        operation: &'static str,
        key: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("no {entity} found with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("query interrupted: {0}")]
    Interrupted(#[from] ContextError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Wraps a driver error, keeping database error codes apart from I/O and
    /// protocol failures.
    pub fn query(operation: &'static str, key: impl ToString, source: sqlx::Error) -> Self {
        let code = source
            .as_database_error()
            .and_then(|db_error| db_error.code())
            .map(|code| code.into_owned());

        match code {
            Some(code) => Self::Database {
                operation,
                key: key.to_string(),
                code,
                source,
            },
            None => Self::Query {
                operation,
                key: key.to_string(),
                source,
            },
        }
    }

    /// The database-specific error code, when the failure came from the engine.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database { source, .. } => source
                .as_database_error()
                .is_some_and(|db_error| db_error.is_unique_violation()),
            _ => false,
        }
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Acquire(_) | Self::Interrupted(ContextError::DeadlineExceeded) => true,
            Self::Database { code, .. } => {
                code.as_str() == SQLITE_BUSY || code.as_str() == SQLITE_LOCKED
            }
            Self::Query { source, .. } => matches!(
                source,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Generic service error that crosses the transport boundary.
///
/// Internal details never travel in these variants; they are logged where
/// the failure is observed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    #[error("{entity} already exists: {identifier}")]
    AlreadyExists { entity: String, identifier: String },

    #[error("Unauthenticated: {message}")]
    Unauthenticated { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(entity: impl Into<String>, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            identifier: identifier.to_string(),
        }
    }

    pub fn already_exists(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_without_code_are_query_errors() {
        let error = StoreError::query("get user by id", 7, sqlx::Error::RowNotFound);
        assert!(matches!(error, StoreError::Query { .. }));
        assert_eq!(error.code(), None);
        assert!(!error.is_unique_violation());
        assert!(!error.is_retryable());
    }

    #[test]
    fn io_and_pool_timeouts_are_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(StoreError::query("insert user", "alice", sqlx::Error::Io(io)).is_retryable());
        assert!(StoreError::query("insert user", "alice", sqlx::Error::PoolTimedOut).is_retryable());
        assert!(StoreError::Interrupted(ContextError::DeadlineExceeded).is_retryable());
        assert!(!StoreError::Interrupted(ContextError::Cancelled).is_retryable());
    }

    #[test]
    fn statement_errors_describe_the_mismatch() {
        let error = StoreError::from(StatementError::ColumnMismatch {
            table: "users",
            columns: 3,
            values: 2,
        });
        assert_eq!(
            error.to_string(),
            "failed to build query: column set for table users declares 3 column(s) but 2 value(s) were supplied"
        );
    }
}
