//! Filter application for actions.
//!
//! Implicit inputs become one AND-ed condition each; explicit `@where`
//! sources compile through the filter visitor. List arguments may carry
//! operator records (`{"startsWith": "x"}`) instead of bare equality
//! values.

use tiller_core::identifiers::to_snake_case;
use tiller_core::{InputBehaviour, InputMode, Record, Value};
use tiller_query::expression::{apply_expressions, apply_implicit_filters};
use tiller_query::{Operator, QueryBuilder, QueryOperand, Scope};

use crate::error::ActionError;

/// Implicit equality filters followed by explicit `@where` sources.
pub(crate) fn apply_action_filters(
    query: &mut QueryBuilder,
    scope: &Scope<'_>,
    filter_inputs: &Record,
    expression_inputs: &Record,
) -> Result<(), ActionError> {
    apply_implicit_filters(query, scope, filter_inputs)?;
    apply_expressions(
        query,
        scope,
        expression_inputs,
        &scope.action.where_expressions,
    )?;
    Ok(())
}

/// List filters: each implicit read input may supply a bare value
/// (equality) or an operator record.
pub(crate) fn apply_list_filters(
    query: &mut QueryBuilder,
    scope: &Scope<'_>,
    where_inputs: &Record,
) -> Result<(), ActionError> {
    for input in &scope.action.inputs {
        if input.mode != InputMode::Read || input.behaviour != InputBehaviour::Implicit {
            continue;
        }
        let Some(value) = where_inputs.get(&input.name) else {
            continue;
        };
        let column = target_column(scope, &input.target)?;
        let operand = QueryOperand::column(scope.table_name(), column);

        match value {
            Value::Record(conditions) => {
                for (operator_name, argument) in conditions {
                    let operator = list_operator(operator_name).ok_or_else(|| {
                        ActionError::InputValidation(format!(
                            "unknown filter operator '{}' on '{}'",
                            operator_name, input.name
                        ))
                    })?;
                    query.and();
                    query.where_(operand.clone(), operator, QueryOperand::value(argument.clone()))?;
                }
            }
            other => {
                query.and();
                query.where_(operand, Operator::Equals, QueryOperand::value(other.clone()))?;
            }
        }
    }
    Ok(())
}

fn target_column(scope: &Scope<'_>, target: &[String]) -> Result<String, ActionError> {
    match target {
        [name] => match scope.model.field(name) {
            Some(field) if field.is_model() => field
                .foreign_key_field_name
                .as_deref()
                .map(to_snake_case)
                .ok_or_else(|| {
                    ActionError::InputValidation(format!(
                        "input target '{}' has no foreign key column",
                        name
                    ))
                }),
            Some(field) => Ok(field.column_name()),
            None => Err(ActionError::InputValidation(format!(
                "input target '{}' is not a field",
                name
            ))),
        },
        [relation, key] if key == "id" => {
            let field = scope.model.field(relation).ok_or_else(|| {
                ActionError::InputValidation(format!("input target '{}' is not a field", relation))
            })?;
            field
                .foreign_key_field_name
                .as_deref()
                .map(to_snake_case)
                .ok_or_else(|| {
                    ActionError::InputValidation(format!(
                        "input target '{}.id' has no foreign key column",
                        relation
                    ))
                })
        }
        other => Err(ActionError::InputValidation(format!(
            "unsupported list filter target '{}'",
            other.join(".")
        ))),
    }
}

fn list_operator(name: &str) -> Option<Operator> {
    match name {
        "equals" => Some(Operator::Equals),
        "notEquals" => Some(Operator::NotEquals),
        "startsWith" => Some(Operator::StartsWith),
        "endsWith" => Some(Operator::EndsWith),
        "contains" => Some(Operator::Contains),
        "oneOf" => Some(Operator::OneOf),
        "notOneOf" => Some(Operator::NotOneOf),
        "lessThan" => Some(Operator::LessThan),
        "lessThanOrEquals" => Some(Operator::LessThanOrEquals),
        "greaterThan" => Some(Operator::GreaterThan),
        "greaterThanOrEquals" => Some(Operator::GreaterThanOrEquals),
        "before" => Some(Operator::Before),
        "after" => Some(Operator::After),
        "onOrBefore" => Some(Operator::OnOrBefore),
        "onOrAfter" => Some(Operator::OnOrAfter),
        _ => None,
    }
}
