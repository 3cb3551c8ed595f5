//! Query operands.

use tiller_core::identifiers::quote_identifier;
use tiller_core::Value;

use crate::builder::{Fragment, QueryBuilder};
use crate::error::QueryError;

/// The smallest unit of a query: one side of a condition, a written
/// value, or a selected expression.
#[derive(Debug, Clone)]
pub enum QueryOperand {
    /// A column reference.
    Column { table: String, column: String },
    /// A bound literal, rendered as a placeholder.
    Value(Value),
    /// SQL NULL, rendered literally so it stays untyped.
    Null,
    /// A raw SQL fragment.
    Raw(String),
    /// An inline subquery yielding a single field.
    InlineQuery {
        query: Box<QueryBuilder>,
        field: String,
    },
}

impl QueryOperand {
    /// A column operand.
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        QueryOperand::Column {
            table: table.into(),
            column: column.into(),
        }
    }

    /// A bound value operand; nulls normalize to [`QueryOperand::Null`].
    pub fn value(value: Value) -> Self {
        if value.is_null() {
            QueryOperand::Null
        } else {
            QueryOperand::Value(value)
        }
    }

    /// Whether the operand is a bound value.
    pub fn is_value(&self) -> bool {
        matches!(self, QueryOperand::Value(_))
    }

    /// Render the operand into a SQL fragment with its bound arguments.
    pub(crate) fn render(&self) -> Result<Fragment, QueryError> {
        match self {
            QueryOperand::Column { table, column } => Ok(Fragment::raw(format!(
                "{}.{}",
                quote_identifier(table),
                quote_identifier(column)
            ))),
            QueryOperand::Value(value) => Ok(Fragment {
                sql: "?".to_string(),
                args: vec![value.clone()],
            }),
            QueryOperand::Null => Ok(Fragment::raw("NULL")),
            QueryOperand::Raw(sql) => Ok(Fragment::raw(sql.clone())),
            QueryOperand::InlineQuery { query, .. } => {
                let inner = query.render_select_parts()?;
                Ok(Fragment {
                    sql: format!("({})", inner.sql),
                    args: inner.args,
                })
            }
        }
    }

    /// A short description used in operand-mismatch errors.
    pub(crate) fn describe(&self) -> String {
        match self {
            QueryOperand::Column { table, column } => format!("column {}.{}", table, column),
            QueryOperand::Value(value) => format!("value {:?}", value),
            QueryOperand::Null => "null".to_string(),
            QueryOperand::Raw(_) => "raw sql".to_string(),
            QueryOperand::InlineQuery { .. } => "subquery".to_string(),
        }
    }
}
