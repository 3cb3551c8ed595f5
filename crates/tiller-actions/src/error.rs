//! Error types for action execution.

use thiserror::Error;
use tiller_auth::AuthError;
use tiller_query::{DatabaseError, QueryError};

/// Errors surfaced by action execution.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The caller may not see or mutate the targeted rows. Mapped from
    /// the resolver's `Ok(false)`, never from an error.
    #[error("permission denied")]
    PermissionDenied,

    /// A unique lookup matched no row.
    #[error("record not found")]
    RecordNotFound,

    /// Query construction failed; aborts the request immediately.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Permission resolution failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The driver reported a failure; passed through verbatim.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// A request payload was malformed: a bad nullable envelope, an
    /// unparseable date/time operand, or a missing required argument.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Hydrating a stored file reference failed.
    #[error("file hydration failed: {0}")]
    FileHydration(String),

    /// A collaborator broke its contract; aborts hard rather than
    /// degrading silently.
    #[error("internal: {0}")]
    Internal(String),
}
