//! The delete action.

use tiller_auth::{authorise, resolve_in_memory};
use tiller_core::Record;
use tiller_query::{QueryBuilder, Scope, Statement};

use crate::error::ActionError;
use crate::filters::apply_action_filters;
use crate::input::validate_required_reads;
use crate::orchestrator::Orchestrator;
use crate::result::ActionResult;

impl Orchestrator {
    /// Render the delete a request would execute.
    pub fn generate_delete_statement(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<Statement, ActionError> {
        validate_required_reads(scope, inputs)?;

        let mut query = QueryBuilder::new(scope.table_name());
        apply_action_filters(&mut query, scope, inputs, inputs)?;
        query.returning_column("id");
        Ok(query.delete_statement()?)
    }

    /// Delete one row by its unique inputs and authorize the result.
    pub async fn execute_delete(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<ActionResult, ActionError> {
        let decision = resolve_in_memory(scope)?;
        if decision == Some(false) {
            return Err(ActionError::PermissionDenied);
        }

        let statement = self.generate_delete_statement(scope, inputs)?;
        let row = statement
            .execute_to_single(scope.database)
            .await?
            .ok_or(ActionError::RecordNotFound)?;

        if decision.is_none() {
            let allowed = authorise(scope, inputs, std::slice::from_ref(&row)).await?;
            if !allowed {
                return Err(ActionError::PermissionDenied);
            }
        }

        let id = row
            .get(scope.model.primary_key_field_name())
            .cloned()
            .ok_or_else(|| {
                ActionError::Internal("delete returned a row without its primary key".to_string())
            })?;
        Ok(ActionResult::Delete(id))
    }
}
