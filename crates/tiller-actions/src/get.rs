//! The get action.

use tiller_auth::{authorise, resolve_in_memory};
use tiller_core::Record;
use tiller_query::{QueryBuilder, Scope, Statement};

use crate::error::ActionError;
use crate::files;
use crate::filters::apply_action_filters;
use crate::input::validate_required_reads;
use crate::orchestrator::Orchestrator;
use crate::result::ActionResult;

impl Orchestrator {
    /// Render the statement a get action would execute.
    pub fn generate_get_statement(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<Statement, ActionError> {
        validate_required_reads(scope, inputs)?;

        let table = scope.table_name();
        let mut query = QueryBuilder::new(table.clone());
        apply_action_filters(&mut query, scope, inputs, inputs)?;
        query.distinct_on(&table, "id");
        query.select_all();
        Ok(query.select_statement()?)
    }

    /// Fetch one row by its unique inputs, authorizing the result.
    pub async fn execute_get(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<ActionResult, ActionError> {
        // Permission rules resolvable in memory decide before any SQL.
        let decision = resolve_in_memory(scope)?;
        if decision == Some(false) {
            return Err(ActionError::PermissionDenied);
        }

        let statement = self.generate_get_statement(scope, inputs)?;
        let row = statement.execute_to_single(scope.database).await?;

        if decision.is_none() {
            if let Some(row) = &row {
                let allowed = authorise(scope, inputs, std::slice::from_ref(row)).await?;
                if !allowed {
                    return Err(ActionError::PermissionDenied);
                }
            }
        }

        let mut row = row;
        if let Some(row) = row.as_mut() {
            files::hydrate_row(scope, self.resolver(), row).await?;
        }
        Ok(ActionResult::Get(row))
    }
}
