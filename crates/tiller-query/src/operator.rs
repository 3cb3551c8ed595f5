//! The fixed operator table.

use tiller_expr::BinaryOp;

use crate::error::QueryError;

/// Comparison operators a filter condition can render.
///
/// Equality is always NULL-safe: `Equals`/`NotEquals` render as
/// `IS [NOT] DISTINCT FROM`, never bare `=`/`!=`, so comparisons against
/// an unauthenticated caller's NULL identity behave deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    OneOf,
    NotOneOf,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Before,
    After,
    OnOrBefore,
    OnOrAfter,
}

impl Operator {
    /// Map an expression-language comparison onto the operator table.
    pub fn from_binary(op: BinaryOp) -> Result<Operator, QueryError> {
        match op {
            BinaryOp::Equals => Ok(Operator::Equals),
            BinaryOp::NotEquals => Ok(Operator::NotEquals),
            BinaryOp::LessThan => Ok(Operator::LessThan),
            BinaryOp::LessThanOrEquals => Ok(Operator::LessThanOrEquals),
            BinaryOp::GreaterThan => Ok(Operator::GreaterThan),
            BinaryOp::GreaterThanOrEquals => Ok(Operator::GreaterThanOrEquals),
            BinaryOp::In => Ok(Operator::OneOf),
            BinaryOp::NotIn => Ok(Operator::NotOneOf),
            other => Err(QueryError::OperandMismatch {
                operator: format!("{:?}", other),
                operand: "a filter condition".to_string(),
            }),
        }
    }

    /// The SQL comparison symbol for ordering operators.
    pub(crate) fn ordering_symbol(self) -> Option<&'static str> {
        match self {
            Operator::LessThan | Operator::Before => Some("<"),
            Operator::LessThanOrEquals | Operator::OnOrBefore => Some("<="),
            Operator::GreaterThan | Operator::After => Some(">"),
            Operator::GreaterThanOrEquals | Operator::OnOrAfter => Some(">="),
            _ => None,
        }
    }
}
