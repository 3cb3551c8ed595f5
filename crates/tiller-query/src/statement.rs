//! Rendered statements.

use serde::Serialize;
use tiller_core::Value;

use crate::database::{Database, DatabaseError, Row};

/// An immutable rendered statement: a SQL template with `?` placeholders
/// and its positional arguments, 1:1 in emission order.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    template: String,
    #[serde(skip)]
    args: Vec<Value>,
}

impl Statement {
    pub(crate) fn new(template: String, args: Vec<Value>) -> Self {
        Self { template, args }
    }

    /// The SQL template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Execute, returning the affected row count.
    pub async fn execute(&self, database: &dyn Database) -> Result<u64, DatabaseError> {
        database.execute(&self.template, &self.args).await
    }

    /// Execute, returning at most one row.
    pub async fn execute_to_single(
        &self,
        database: &dyn Database,
    ) -> Result<Option<Row>, DatabaseError> {
        database.execute_to_single(&self.template, &self.args).await
    }

    /// Execute, returning all rows plus the unlimited total count.
    pub async fn execute_to_many(
        &self,
        database: &dyn Database,
    ) -> Result<(Vec<Row>, u64), DatabaseError> {
        database.execute_to_many(&self.template, &self.args).await
    }
}
