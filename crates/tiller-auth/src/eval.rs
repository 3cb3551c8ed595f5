//! In-memory expression evaluation.
//!
//! Only pure, non-database expressions evaluate here: literals, `ctx.*`
//! values and their combinations. Anything touching model fields or
//! aggregate functions returns `None` and falls through to the SQL
//! probe.

use tiller_core::{RequestContext, Value};
use tiller_expr::{BinaryOp, Expr};

/// Evaluate an expression to a value, if it is context-pure.
pub(crate) fn try_evaluate(expr: &Expr, context: &RequestContext) -> Option<Value> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),

        Expr::Group(inner) => try_evaluate(inner, context),

        Expr::Ident(path) => evaluate_ident(path, context),

        Expr::Array(items) => {
            let values: Option<Vec<Value>> =
                items.iter().map(|item| try_evaluate(item, context)).collect();
            values.map(Value::List)
        }

        Expr::And(lhs, rhs) => {
            // A known-false side decides the conjunction even when the
            // other side cannot be evaluated.
            let left = try_bool(lhs, context);
            let right = try_bool(rhs, context);
            match (left, right) {
                (Some(false), _) | (_, Some(false)) => Some(Value::Bool(false)),
                (Some(true), Some(true)) => Some(Value::Bool(true)),
                _ => None,
            }
        }

        Expr::Or(lhs, rhs) => {
            let left = try_bool(lhs, context);
            let right = try_bool(rhs, context);
            match (left, right) {
                (Some(true), _) | (_, Some(true)) => Some(Value::Bool(true)),
                (Some(false), Some(false)) => Some(Value::Bool(false)),
                _ => None,
            }
        }

        Expr::Not(inner) => match try_bool(inner, context) {
            Some(b) => Some(Value::Bool(!b)),
            None => None,
        },

        Expr::Binary { op, lhs, rhs } => {
            let left = try_evaluate(lhs, context)?;
            let right = try_evaluate(rhs, context)?;
            evaluate_binary(*op, &left, &right)
        }

        Expr::Function { .. } => None,
    }
}

/// Evaluate to a boolean; NULL counts as false, as it does in SQL
/// filter position.
pub(crate) fn try_bool(expr: &Expr, context: &RequestContext) -> Option<bool> {
    match try_evaluate(expr, context)? {
        Value::Bool(b) => Some(b),
        Value::Null => Some(false),
        _ => None,
    }
}

fn evaluate_ident(path: &[String], context: &RequestContext) -> Option<Value> {
    if path.first().map(String::as_str) != Some("ctx") {
        return None;
    }
    match path.get(1).map(String::as_str) {
        Some("isAuthenticated") => Some(Value::Bool(context.is_authenticated())),
        Some("now") => Some(Value::Timestamp(context.now)),
        Some("headers") => {
            let name = path.get(2)?;
            Some(
                context
                    .headers
                    .get(name)
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null),
            )
        }
        Some("identity") => {
            let identity = context.identity.as_ref();
            match path.get(2).map(String::as_str) {
                None | Some("id") => Some(
                    identity
                        .map(|i| Value::String(i.id.clone()))
                        .unwrap_or(Value::Null),
                ),
                Some("email") => Some(
                    identity
                        .map(|i| Value::String(i.email.clone()))
                        .unwrap_or(Value::Null),
                ),
                Some("emailVerified") => Some(
                    identity
                        .map(|i| Value::Bool(i.email_verified))
                        .unwrap_or(Value::Null),
                ),
                Some("issuer") => Some(
                    identity
                        .map(|i| Value::String(i.issuer.clone()))
                        .unwrap_or(Value::Null),
                ),
                // Backlinks into the data model need the database.
                Some(_) => None,
            }
        }
        _ => None,
    }
}

fn evaluate_binary(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    match op {
        BinaryOp::Equals => Some(Value::Bool(left == right)),
        BinaryOp::NotEquals => Some(Value::Bool(left != right)),

        BinaryOp::In | BinaryOp::NotIn => {
            let Value::List(items) = right else {
                return None;
            };
            let contained = items.contains(left);
            Some(Value::Bool(if op == BinaryOp::In {
                contained
            } else {
                !contained
            }))
        }

        BinaryOp::LessThan
        | BinaryOp::LessThanOrEquals
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEquals => {
            let ordering = compare(left, right)?;
            let result = match op {
                BinaryOp::LessThan => ordering.is_lt(),
                BinaryOp::LessThanOrEquals => ordering.is_le(),
                BinaryOp::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Some(Value::Bool(result))
        }

        BinaryOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Some(Value::Int(a + b)),
            (Value::Float(a), Value::Float(b)) => Some(Value::Float(a + b)),
            (Value::String(a), Value::String(b)) => Some(Value::String(format!("{}{}", a, b))),
            _ => None,
        },
        BinaryOp::Subtract => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Some(Value::Int(a - b)),
            (Value::Float(a), Value::Float(b)) => Some(Value::Float(a - b)),
            _ => None,
        },
        BinaryOp::Multiply => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Some(Value::Int(a * b)),
            (Value::Float(a), Value::Float(b)) => Some(Value::Float(a * b)),
            _ => None,
        },
        BinaryOp::Divide => match (left, right) {
            (Value::Int(a), Value::Int(b)) if *b != 0 => Some(Value::Int(a / b)),
            (Value::Float(a), Value::Float(b)) if *b != 0.0 => Some(Value::Float(a / b)),
            _ => None,
        },
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
