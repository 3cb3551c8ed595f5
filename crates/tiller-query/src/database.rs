//! The seam to the SQL driver.

use async_trait::async_trait;
use thiserror::Error;
use tiller_core::Value;

/// A decoded database row.
pub type Row = tiller_core::Record;

/// A driver error, passed through verbatim. Retry policy, if any,
/// belongs to the caller.
#[derive(Debug, Clone, Error)]
#[error("database error: {message}")]
pub struct DatabaseError {
    pub message: String,
}

impl DatabaseError {
    /// Wrap a driver error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Narrow async interface the engine issues statements through.
///
/// Templates use `?` placeholders; the adapter converts them to the
/// driver's positional form. The engine never opens transactions
/// through this trait - a handle may already be scoped to one by the
/// caller. Cancellation rides the ambient async context.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, DatabaseError>;

    /// Execute a query expected to yield at most one row.
    async fn execute_to_single(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Row>, DatabaseError>;

    /// Execute a query yielding many rows plus the unlimited total
    /// count (lifted from a window-count column when present).
    async fn execute_to_many(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<(Vec<Row>, u64), DatabaseError>;
}
