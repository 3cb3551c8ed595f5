//! The create action.
//!
//! The row is inserted with `RETURNING` and then authorized on the same
//! request-scoped connection; a check cannot precede a row that does
//! not yet exist. Denial surfaces as [`ActionError::PermissionDenied`]
//! for the transaction-owning caller to roll back.

use std::collections::BTreeSet;

use tiller_auth::{authorise, resolve_in_memory};
use tiller_core::identifiers::to_snake_case;
use tiller_core::{InputBehaviour, InputMode, Record, Value};
use tiller_query::expression::resolve_assignment;
use tiller_query::{QueryBuilder, QueryOperand, Scope, Statement};

use crate::error::ActionError;
use crate::files;
use crate::orchestrator::Orchestrator;
use crate::result::ActionResult;

impl Orchestrator {
    /// Render the insert a create action would execute.
    pub fn generate_create_statement(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<Statement, ActionError> {
        let mut query = QueryBuilder::new(scope.table_name());
        let mut written = BTreeSet::new();

        for input in &scope.action.inputs {
            if input.mode != InputMode::Write || input.behaviour != InputBehaviour::Implicit {
                continue;
            }
            let value = match inputs.get(&input.name) {
                Some(value) => value.clone(),
                None if input.optional => continue,
                None => {
                    return Err(ActionError::InputValidation(format!(
                        "missing required argument '{}'",
                        input.name
                    )))
                }
            };
            let column = write_column(scope, input)?;
            query.set_value(column.clone(), QueryOperand::value(value));
            written.insert(column);
        }

        for source in &scope.action.set_expressions {
            let (column, operand) = resolve_assignment(scope, inputs, source)?;
            query.set_value(column.clone(), operand);
            written.insert(column);
        }

        // Engine-supplied defaults for columns the request left unset.
        if scope.model.has_field("id") && !written.contains("id") {
            query.set_value(
                "id",
                QueryOperand::value(Value::String(uuid::Uuid::new_v4().to_string())),
            );
        }
        for (field, column) in [("createdAt", "created_at"), ("updatedAt", "updated_at")] {
            if scope.model.has_field(field) && !written.contains(column) {
                query.set_value(
                    column,
                    QueryOperand::value(Value::Timestamp(scope.context.now)),
                );
            }
        }

        query.returning_all();
        Ok(query.insert_statement()?)
    }

    /// Insert a row and authorize the result.
    pub async fn execute_create(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<ActionResult, ActionError> {
        let decision = resolve_in_memory(scope)?;
        if decision == Some(false) {
            return Err(ActionError::PermissionDenied);
        }

        let statement = self.generate_create_statement(scope, inputs)?;
        let row = statement
            .execute_to_single(scope.database)
            .await?
            .ok_or_else(|| ActionError::Internal("insert returned no row".to_string()))?;

        if decision.is_none() {
            let allowed = authorise(scope, inputs, std::slice::from_ref(&row)).await?;
            if !allowed {
                return Err(ActionError::PermissionDenied);
            }
        }

        let mut row = row;
        files::hydrate_row(scope, self.resolver(), &mut row).await?;
        Ok(ActionResult::Create(row))
    }
}

/// The column an implicit write input lands in; a relationship input
/// writes its foreign key.
pub(crate) fn write_column(
    scope: &Scope<'_>,
    input: &tiller_core::Input,
) -> Result<String, ActionError> {
    let fragment = input.target.first().ok_or_else(|| {
        ActionError::InputValidation(format!("input '{}' has no target field", input.name))
    })?;
    let field = scope.model.field(fragment).ok_or_else(|| {
        ActionError::InputValidation(format!("input target '{}' is not a field", fragment))
    })?;
    if field.is_model() {
        return field
            .foreign_key_field_name
            .as_deref()
            .map(to_snake_case)
            .ok_or_else(|| {
                ActionError::InputValidation(format!(
                    "input target '{}' has no foreign key column",
                    fragment
                ))
            });
    }
    Ok(field.column_name())
}
