//! The update action.
//!
//! The mutation executes with `RETURNING` and the optional permission
//! probe runs on the returned row over the same request-scoped
//! connection; denial is the transaction-owning caller's signal to roll
//! back.

use tiller_auth::{authorise, resolve_in_memory};
use tiller_core::{InputBehaviour, InputMode, Record, Value};
use tiller_query::expression::resolve_assignment;
use tiller_query::{QueryBuilder, QueryOperand, Scope, Statement};

use crate::create::write_column;
use crate::error::ActionError;
use crate::files;
use crate::filters::apply_action_filters;
use crate::input;
use crate::orchestrator::Orchestrator;
use crate::result::ActionResult;

impl Orchestrator {
    /// Render the update a request would execute. Inputs arrive as
    /// `{where: {...}, values: {...}}`.
    pub fn generate_update_statement(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<Statement, ActionError> {
        let where_inputs = input::sub_record(inputs, "where")?;
        let values_inputs = input::sub_record(inputs, "values")?;
        let merged = input::merged_inputs(inputs);
        input::validate_required_reads(scope, &where_inputs)?;

        let mut query = QueryBuilder::new(scope.table_name());

        // Partial updates: only supplied write inputs become
        // assignments.
        for action_input in &scope.action.inputs {
            if action_input.mode != InputMode::Write
                || action_input.behaviour != InputBehaviour::Implicit
            {
                continue;
            }
            let Some(value) = values_inputs.get(&action_input.name) else {
                continue;
            };
            let column = write_column(scope, action_input)?;
            query.set_value(column, QueryOperand::value(value.clone()));
        }

        for source in &scope.action.set_expressions {
            let (column, operand) = resolve_assignment(scope, &merged, source)?;
            query.set_value(column, operand);
        }

        if scope.model.has_field("updatedAt") {
            query.set_value(
                "updated_at",
                QueryOperand::value(Value::Timestamp(scope.context.now)),
            );
        }

        apply_action_filters(&mut query, scope, &where_inputs, &merged)?;
        query.returning_all();
        Ok(query.update_statement()?)
    }

    /// Update one row by its unique inputs and authorize the result.
    pub async fn execute_update(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<ActionResult, ActionError> {
        let decision = resolve_in_memory(scope)?;
        if decision == Some(false) {
            return Err(ActionError::PermissionDenied);
        }

        let statement = self.generate_update_statement(scope, inputs)?;
        let row = statement
            .execute_to_single(scope.database)
            .await?
            .ok_or(ActionError::RecordNotFound)?;

        if decision.is_none() {
            let merged = input::merged_inputs(inputs);
            let allowed = authorise(scope, &merged, std::slice::from_ref(&row)).await?;
            if !allowed {
                return Err(ActionError::PermissionDenied);
            }
        }

        let mut row = row;
        files::hydrate_row(scope, self.resolver(), &mut row).await?;
        Ok(ActionResult::Update(row))
    }
}
