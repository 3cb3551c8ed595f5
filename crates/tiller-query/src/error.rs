//! Error types for query construction.

use thiserror::Error;

/// Errors raised while building or rendering a query.
///
/// Construction errors surface immediately and abort the request; they
/// are never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    /// An operator has no rendering for the supplied operands.
    #[error("operator {operator} cannot be applied to {operand}")]
    OperandMismatch { operator: String, operand: String },

    /// A function name is not in the supported set.
    #[error("unsupported function '{name}'")]
    UnsupportedFunction { name: String },

    /// An identifier path failed to resolve against the schema.
    ///
    /// The schema builder validates expressions before they reach the
    /// engine, so this is an internal error.
    #[error("unresolved identifier path '{path}'")]
    SchemaResolution { path: String },

    /// An expression source failed to parse.
    #[error("invalid expression: {0}")]
    Expression(#[from] tiller_expr::ExprError),

    /// A terminal renderer was invoked without the pieces it needs.
    #[error("cannot render statement: {reason}")]
    MalformedStatement { reason: String },

    /// A visitor was driven through an event sequence it cannot accept.
    #[error("malformed expression term: {reason}")]
    MalformedTerm { reason: String },
}
