//! Error types for permission resolution.
//!
//! A denial is not an error: [`authorise`](crate::authorise) returns
//! `Ok(false)` and callers map that to their own permission-denied
//! failure.

use thiserror::Error;
use tiller_query::{DatabaseError, QueryError};

/// Errors raised while resolving permissions.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Building the permission probe failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The probe execution failed; passed through verbatim.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// A candidate row arrived without its primary key - a contract
    /// breach by the caller.
    #[error("candidate row is missing its primary key")]
    MissingPrimaryKey,
}
