//! `@set` assignment compilation.
//!
//! An assignment source (`post.ownerId = ctx.identity.id`) resolves to
//! a target column plus a [`QueryOperand`] for the right-hand side,
//! staged into the builder's write values. Identifier right-hand sides
//! resolve like any other identifier - context values bind as
//! arguments, relationship paths become correlated lookups - while
//! arithmetic right-hand sides compile through the expression visitor
//! with literals inlined.

use tiller_core::identifiers::to_snake_case;
use tiller_core::Record;
use tiller_expr::{parse_assignment, walk, Expr};

use crate::error::QueryError;
use crate::expression::ident::{resolve_ident, ResolveRequest};
use crate::expression::{RelationStrategy, SqlVisitor};
use crate::operand::QueryOperand;
use crate::scope::Scope;

/// Compile one `@set` source into `(column, operand)`.
pub fn resolve_assignment(
    scope: &Scope<'_>,
    inputs: &Record,
    source: &str,
) -> Result<(String, QueryOperand), QueryError> {
    let (target, rhs) = parse_assignment(source)?;
    let column = resolve_target_column(scope, &target)?;
    let operand = resolve_rhs(scope, inputs, &rhs)?;
    Ok((column, operand))
}

/// The column a `@set` target path writes to. The path is rooted at the
/// scoped model; a terminal relationship writes its foreign key column.
fn resolve_target_column(scope: &Scope<'_>, target: &[String]) -> Result<String, QueryError> {
    let unresolved = || QueryError::SchemaResolution {
        path: target.join("."),
    };

    let fragments: &[String] = match target.first() {
        Some(first) if to_snake_case(first) == scope.model.table_name() => &target[1..],
        _ => target,
    };
    let [name] = fragments else {
        return Err(unresolved());
    };

    if let Some(field) = scope.model.field(name) {
        if field.is_model() {
            let fk = field.foreign_key_field_name.as_deref().ok_or_else(unresolved)?;
            return Ok(to_snake_case(fk));
        }
        return Ok(field.column_name());
    }

    // The foreign-key sibling of a relationship field is a valid target
    // even when not declared as its own field.
    let is_foreign_key = scope
        .model
        .fields
        .iter()
        .any(|f| f.foreign_key_field_name.as_deref() == Some(name.as_str()));
    if is_foreign_key {
        return Ok(to_snake_case(name));
    }

    Err(unresolved())
}

fn resolve_rhs(
    scope: &Scope<'_>,
    inputs: &Record,
    rhs: &Expr,
) -> Result<QueryOperand, QueryError> {
    match rhs {
        Expr::Literal(value) => Ok(QueryOperand::value(value.clone())),

        Expr::Ident(path) => {
            // Relationship lookups correlate on the scoped table itself,
            // which is valid inside INSERT ... SELECT and UPDATE ... SET.
            let request = ResolveRequest {
                schema: scope.schema,
                model: scope.model,
                context: scope.context,
                inputs,
                strategy: RelationStrategy::Correlated {
                    row_alias: scope.table_name(),
                },
            };
            Ok(resolve_ident(&request, path)?.operand)
        }

        Expr::Group(inner) => resolve_rhs(scope, inputs, inner),

        // Arithmetic and aggregate right-hand sides compile to one
        // expression string with literals inlined.
        other => {
            let mut visitor =
                SqlVisitor::computed(scope, inputs, scope.table_name());
            walk(other, &mut visitor)?;
            let (sql, args) = visitor.into_expression()?;
            if !args.is_empty() {
                return Err(QueryError::MalformedTerm {
                    reason: "assignment expression requires inline-renderable operands"
                        .to_string(),
                });
            }
            Ok(QueryOperand::Raw(sql))
        }
    }
}
