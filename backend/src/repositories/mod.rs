//! Typed repositories over the pooled database connection.

use crate::errors::StoreError;
use std::time::Duration;
use tracing::warn;

pub mod role_repository;
pub mod user_repository;

/// Budget for a single repository call, nested inside the caller's deadline.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Logs a store failure with its database error code, then hands it back.
pub(crate) fn log_failure(error: StoreError) -> StoreError {
    match error.code() {
        Some(code) => warn!(db_error_code = code, error = %error, "Database error"),
        None => warn!(error = %error, "Store operation failed"),
    }
    error
}
