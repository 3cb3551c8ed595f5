//! Identifier-path resolution.
//!
//! Normalizes a dotted field path (e.g. `invoice.item.product.price`)
//! against the schema and produces a query operand plus whatever joins
//! or correlated subqueries the active relationship strategy calls for.

use tiller_core::identifiers::{quote_identifier, to_snake_case};
use tiller_core::{Field, FieldType, Model, Record, RelationshipKind, RequestContext, Schema, Value};

use crate::builder::{Join, QueryBuilder};
use crate::error::QueryError;
use crate::expression::RelationStrategy;
use crate::operand::QueryOperand;

/// Everything resolution needs from the surrounding request.
pub(crate) struct ResolveRequest<'a> {
    pub schema: &'a Schema,
    pub model: &'a Model,
    pub context: &'a RequestContext,
    pub inputs: &'a Record,
    pub strategy: RelationStrategy,
}

/// A resolved identifier: the operand, its statically known type, and
/// the joins the path requires.
pub(crate) struct ResolvedIdent {
    pub operand: QueryOperand,
    pub field_type: Option<FieldType>,
    pub joins: Vec<Join>,
}

impl ResolvedIdent {
    fn value(value: Value, field_type: Option<FieldType>) -> Self {
        Self {
            operand: QueryOperand::value(value),
            field_type,
            joins: Vec::new(),
        }
    }
}

/// Resolve a full identifier path.
pub(crate) fn resolve_ident(
    request: &ResolveRequest<'_>,
    path: &[String],
) -> Result<ResolvedIdent, QueryError> {
    if path.is_empty() {
        return Err(unresolved(path));
    }

    if path[0] == "ctx" {
        return resolve_ctx(request, path);
    }

    // A path rooted at the scoped model.
    if to_snake_case(&path[0]) == request.model.table_name() {
        return resolve_model_path(request, request.model, base_alias(request), &path[1..], path);
    }

    // A bare name: an explicit input argument.
    if path.len() == 1 {
        let value = request.inputs.get(&path[0]).cloned().unwrap_or(Value::Null);
        return Ok(ResolvedIdent::value(value, None));
    }

    Err(unresolved(path))
}

/// The table alias the base model is referenced through.
fn base_alias(request: &ResolveRequest<'_>) -> String {
    match &request.strategy {
        RelationStrategy::Joins { base_alias } => base_alias.clone(),
        RelationStrategy::Correlated { row_alias } => row_alias.clone(),
    }
}

fn unresolved(path: &[String]) -> QueryError {
    QueryError::SchemaResolution {
        path: path.join("."),
    }
}

/// `ctx.*` identifiers: authentication state, the identity's own
/// attributes, headers, and identity backlinks into the data model.
fn resolve_ctx(
    request: &ResolveRequest<'_>,
    path: &[String],
) -> Result<ResolvedIdent, QueryError> {
    let context = request.context;
    match path.get(1).map(String::as_str) {
        Some("isAuthenticated") => Ok(ResolvedIdent::value(
            Value::Bool(context.is_authenticated()),
            Some(FieldType::Boolean),
        )),
        Some("now") => Ok(ResolvedIdent::value(
            Value::Timestamp(context.now),
            Some(FieldType::Timestamp),
        )),
        Some("headers") => {
            let name = path.get(2).ok_or_else(|| unresolved(path))?;
            let value = context
                .headers
                .get(name)
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null);
            Ok(ResolvedIdent::value(value, Some(FieldType::Text)))
        }
        Some("identity") => {
            let identity = context.identity.as_ref();
            match path.get(2).map(String::as_str) {
                // `ctx.identity` compares as the identity's id.
                None | Some("id") => Ok(ResolvedIdent::value(
                    identity
                        .map(|i| Value::String(i.id.clone()))
                        .unwrap_or(Value::Null),
                    Some(FieldType::Id),
                )),
                Some("email") => Ok(ResolvedIdent::value(
                    identity
                        .map(|i| Value::String(i.email.clone()))
                        .unwrap_or(Value::Null),
                    Some(FieldType::Text),
                )),
                Some("emailVerified") => Ok(ResolvedIdent::value(
                    identity
                        .map(|i| Value::Bool(i.email_verified))
                        .unwrap_or(Value::Null),
                    Some(FieldType::Boolean),
                )),
                Some("issuer") => Ok(ResolvedIdent::value(
                    identity
                        .map(|i| Value::String(i.issuer.clone()))
                        .unwrap_or(Value::Null),
                    Some(FieldType::Text),
                )),
                // Anything else is a backlink through the Identity model,
                // compiled as a correlated subquery on the identity id.
                Some(_) => resolve_identity_backlink(request, path),
            }
        }
        _ => Err(unresolved(path)),
    }
}

/// `ctx.identity.<backlink>...`: a subquery rooted at the identity
/// table, filtered to the caller's identity id.
fn resolve_identity_backlink(
    request: &ResolveRequest<'_>,
    path: &[String],
) -> Result<ResolvedIdent, QueryError> {
    let identity_model = request
        .schema
        .model("Identity")
        .ok_or_else(|| unresolved(path))?;
    let identity_table = identity_model.table_name();

    let identity_id = request
        .context
        .identity
        .as_ref()
        .map(|i| Value::String(i.id.clone()))
        .unwrap_or(Value::Null);

    // Resolve the remaining path rooted at the identity model; its joins
    // live inside the subquery.
    let inner_request = ResolveRequest {
        schema: request.schema,
        model: identity_model,
        context: request.context,
        inputs: request.inputs,
        strategy: RelationStrategy::Joins {
            base_alias: identity_table.clone(),
        },
    };
    let resolved = resolve_model_path(
        &inner_request,
        identity_model,
        identity_table.clone(),
        &path[2..],
        path,
    )?;

    let column_sql = match &resolved.operand {
        QueryOperand::Column { table, column } => format!(
            "{}.{}",
            quote_identifier(table),
            quote_identifier(column)
        ),
        _ => return Err(unresolved(path)),
    };

    let mut query = QueryBuilder::new(identity_table.clone());
    query.select_raw(column_sql.clone());
    for join in resolved.joins {
        query.join(join);
    }
    query.where_(
        QueryOperand::column(&identity_table, "id"),
        crate::operator::Operator::Equals,
        QueryOperand::value(identity_id),
    )?;

    Ok(ResolvedIdent {
        operand: QueryOperand::InlineQuery {
            query: Box::new(query),
            field: column_sql,
        },
        field_type: resolved.field_type,
        joins: Vec::new(),
    })
}

/// Resolve path fragments against a model, producing joins per the
/// strategy. `fragments` excludes the leading model fragment.
fn resolve_model_path(
    request: &ResolveRequest<'_>,
    root: &Model,
    root_alias: String,
    fragments: &[String],
    full_path: &[String],
) -> Result<ResolvedIdent, QueryError> {
    if fragments.is_empty() {
        // The model itself compares as its primary key.
        return Ok(ResolvedIdent {
            operand: QueryOperand::column(&root_alias, root.primary_key_field_name()),
            field_type: Some(FieldType::Id),
            joins: Vec::new(),
        });
    }

    // Correlated strategy: a relationship path compiles into a scalar
    // subquery instead of joins on the outer statement.
    if let RelationStrategy::Correlated { row_alias } = &request.strategy {
        let first = root
            .field(&fragments[0])
            .ok_or_else(|| unresolved(full_path))?;
        if first.is_model() && fragments.len() > 1 {
            return resolve_correlated_scalar(request, root, row_alias, fragments, full_path);
        }
    }

    let mut current_model = root;
    let mut current_alias = root_alias;
    let mut joins = Vec::new();

    for (index, fragment) in fragments.iter().enumerate() {
        let field = current_model
            .field(fragment)
            .ok_or_else(|| unresolved(full_path))?;
        let last = index == fragments.len() - 1;

        let kind = request.schema.relationship_kind(current_model, field);
        match kind {
            None => {
                if !last {
                    return Err(unresolved(full_path));
                }
                return Ok(ResolvedIdent {
                    operand: QueryOperand::column(&current_alias, field.column_name()),
                    field_type: Some(field.field_type.clone()),
                    joins,
                });
            }
            Some(kind) => {
                // A terminal belongs-to compares as its foreign key
                // column, with no join at all.
                if last && kind == RelationshipKind::BelongsTo {
                    let fk = field
                        .foreign_key_field_name
                        .as_deref()
                        .ok_or_else(|| unresolved(full_path))?;
                    return Ok(ResolvedIdent {
                        operand: QueryOperand::column(&current_alias, to_snake_case(fk)),
                        field_type: Some(FieldType::Id),
                        joins,
                    });
                }

                let (join, related_model, alias) =
                    relationship_join(request.schema, current_model, &current_alias, field)
                        .ok_or_else(|| unresolved(full_path))?;
                joins.push(join);

                if last {
                    // A terminal has-one / has-many compares as the
                    // related primary key.
                    return Ok(ResolvedIdent {
                        operand: QueryOperand::column(&alias, "id"),
                        field_type: Some(FieldType::Id),
                        joins,
                    });
                }

                current_model = related_model;
                current_alias = alias;
            }
        }
    }

    Err(unresolved(full_path))
}

/// The LEFT JOIN for one relationship hop, NULL-safe on the key.
fn relationship_join<'s>(
    schema: &'s Schema,
    model: &Model,
    current_alias: &str,
    field: &Field,
) -> Option<(Join, &'s Model, String)> {
    let related_name = match &field.field_type {
        FieldType::Model(name) => name.as_str(),
        _ => return None,
    };
    let related = schema.model(related_name)?;
    let related_table = related.table_name();
    let alias = format!("{}${}", current_alias, to_snake_case(&field.name));

    let on = match schema.relationship_kind(model, field)? {
        RelationshipKind::BelongsTo => {
            let fk = to_snake_case(field.foreign_key_field_name.as_deref()?);
            format!(
                "{}.{} IS NOT DISTINCT FROM {}.{}",
                quote_identifier(current_alias),
                quote_identifier(&fk),
                quote_identifier(&alias),
                quote_identifier("id")
            )
        }
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            let fk = match schema.foreign_key_column(model, field)? {
                tiller_core::schema::ForeignKey::OnRelated { column } => column,
                tiller_core::schema::ForeignKey::OnSelf { column } => column,
            };
            format!(
                "{}.{} IS NOT DISTINCT FROM {}.{}",
                quote_identifier(&alias),
                quote_identifier(&fk),
                quote_identifier(current_alias),
                quote_identifier("id")
            )
        }
    };

    Some((Join::left(related_table, alias.clone(), on), related, alias))
}

/// A to-one relationship path under the correlated strategy: one scalar
/// subquery selecting the final column, correlated on the row alias.
fn resolve_correlated_scalar(
    request: &ResolveRequest<'_>,
    root: &Model,
    row_alias: &str,
    fragments: &[String],
    full_path: &[String],
) -> Result<ResolvedIdent, QueryError> {
    let first = root
        .field(&fragments[0])
        .ok_or_else(|| unresolved(full_path))?;
    let related_name = match &first.field_type {
        FieldType::Model(name) => name.clone(),
        _ => return Err(unresolved(full_path)),
    };
    let related = request
        .schema
        .model(&related_name)
        .ok_or_else(|| unresolved(full_path))?;
    let related_table = related.table_name();

    let correlation = match request.schema.relationship_kind(root, first) {
        Some(RelationshipKind::BelongsTo) => {
            let fk = to_snake_case(
                first
                    .foreign_key_field_name
                    .as_deref()
                    .ok_or_else(|| unresolved(full_path))?,
            );
            format!(
                "{}.{} IS NOT DISTINCT FROM {}.{}",
                quote_identifier(&related_table),
                quote_identifier("id"),
                quote_identifier(row_alias),
                quote_identifier(&fk)
            )
        }
        Some(RelationshipKind::HasOne) => {
            let fk = match request
                .schema
                .foreign_key_column(root, first)
                .ok_or_else(|| unresolved(full_path))?
            {
                tiller_core::schema::ForeignKey::OnRelated { column } => column,
                tiller_core::schema::ForeignKey::OnSelf { column } => column,
            };
            format!(
                "{}.{} IS NOT DISTINCT FROM {}.{}",
                quote_identifier(&related_table),
                quote_identifier(&fk),
                quote_identifier(row_alias),
                quote_identifier("id")
            )
        }
        // A to-many hop is only meaningful under an aggregate.
        _ => return Err(unresolved(full_path)),
    };

    // The rest of the path resolves inside the subquery with joins.
    let inner_request = ResolveRequest {
        schema: request.schema,
        model: related,
        context: request.context,
        inputs: request.inputs,
        strategy: RelationStrategy::Joins {
            base_alias: related_table.clone(),
        },
    };
    let resolved = resolve_model_path(
        &inner_request,
        related,
        related_table.clone(),
        &fragments[1..],
        full_path,
    )?;

    let column_sql = match &resolved.operand {
        QueryOperand::Column { table, column } => format!(
            "{}.{}",
            quote_identifier(table),
            quote_identifier(column)
        ),
        _ => return Err(unresolved(full_path)),
    };

    let mut query = QueryBuilder::new(related_table);
    query.select_raw(column_sql.clone());
    for join in resolved.joins {
        query.join(join);
    }
    query.where_raw(correlation, Vec::new());

    Ok(ResolvedIdent {
        operand: QueryOperand::InlineQuery {
            query: Box::new(query),
            field: column_sql,
        },
        field_type: resolved.field_type,
        joins: Vec::new(),
    })
}

/// The compiled shape of an aggregate's target path.
pub(crate) struct AggregateTarget {
    /// Joins on the outer statement for hops before the to-many edge.
    pub outer_joins: Vec<Join>,
    /// The child model of the to-many edge, if there is one.
    pub child: Option<AggregateChild>,
    /// For purely scalar paths: the column to aggregate in place.
    pub scalar_column: Option<String>,
    /// The aggregated column's statically known type.
    pub column_type: Option<FieldType>,
}

pub(crate) struct AggregateChild {
    pub model_name: String,
    pub table: String,
    /// Correlation predicate tying the child to the outer row.
    pub correlation: String,
    /// Joins inside the subquery for the path past the to-many edge.
    pub inner_joins: Vec<Join>,
    /// The aggregated column reference inside the subquery.
    pub column_sql: String,
    /// The path prefix (including the to-many fragment) stripped from
    /// identifiers in a filtered aggregate's predicate argument.
    pub strip_prefix: Vec<String>,
}

/// Resolve the identifier an aggregate function is applied to.
pub(crate) fn resolve_aggregate_target(
    request: &ResolveRequest<'_>,
    path: &[String],
) -> Result<AggregateTarget, QueryError> {
    if path.is_empty() || to_snake_case(&path[0]) != request.model.table_name() {
        return Err(unresolved(path));
    }
    let fragments = &path[1..];

    // Find the first to-many hop.
    let mut to_many_index = None;
    let mut probe_model = request.model;
    for (index, fragment) in fragments.iter().enumerate() {
        let field = probe_model
            .field(fragment)
            .ok_or_else(|| unresolved(path))?;
        match request.schema.relationship_kind(probe_model, field) {
            Some(RelationshipKind::HasMany) => {
                to_many_index = Some(index);
                break;
            }
            Some(_) => {
                let name = match &field.field_type {
                    FieldType::Model(name) => name,
                    _ => return Err(unresolved(path)),
                };
                probe_model = request
                    .schema
                    .model(name)
                    .ok_or_else(|| unresolved(path))?;
            }
            None => break,
        }
    }

    let Some(index) = to_many_index else {
        // No to-many traversal: aggregate the column in place.
        let resolved = resolve_model_path(
            request,
            request.model,
            base_alias(request),
            fragments,
            path,
        )?;
        let column_sql = match &resolved.operand {
            QueryOperand::Column { table, column } => format!(
                "{}.{}",
                quote_identifier(table),
                quote_identifier(column)
            ),
            _ => return Err(unresolved(path)),
        };
        return Ok(AggregateTarget {
            outer_joins: resolved.joins,
            child: None,
            scalar_column: Some(column_sql),
            column_type: resolved.field_type,
        });
    };

    // Hops before the to-many edge join on the outer statement; under
    // the correlated strategy such prefixes are not supported.
    let (outer_alias, outer_model, outer_joins) = if index == 0 {
        (base_alias(request), request.model, Vec::new())
    } else {
        if matches!(request.strategy, RelationStrategy::Correlated { .. }) {
            return Err(unresolved(path));
        }
        let mut current_model = request.model;
        let mut current_alias = base_alias(request);
        let mut joins = Vec::new();
        for fragment in &fragments[..index] {
            let field = current_model
                .field(fragment)
                .ok_or_else(|| unresolved(path))?;
            let (join, related, alias) =
                relationship_join(request.schema, current_model, &current_alias, field)
                    .ok_or_else(|| unresolved(path))?;
            joins.push(join);
            current_model = related;
            current_alias = alias;
        }
        (current_alias, current_model, joins)
    };

    let to_many_field = outer_model
        .field(&fragments[index])
        .ok_or_else(|| unresolved(path))?;
    let child_name = match &to_many_field.field_type {
        FieldType::Model(name) => name.clone(),
        _ => return Err(unresolved(path)),
    };
    let child = request
        .schema
        .model(&child_name)
        .ok_or_else(|| unresolved(path))?;
    let child_table = child.table_name();

    let fk = match request
        .schema
        .foreign_key_column(outer_model, to_many_field)
        .ok_or_else(|| unresolved(path))?
    {
        tiller_core::schema::ForeignKey::OnRelated { column } => column,
        tiller_core::schema::ForeignKey::OnSelf { column } => column,
    };
    let correlation = format!(
        "{}.{} IS NOT DISTINCT FROM {}.{}",
        quote_identifier(&child_table),
        quote_identifier(&fk),
        quote_identifier(&outer_alias),
        quote_identifier("id")
    );

    // The remaining path resolves inside the subquery.
    let remaining = &fragments[index + 1..];
    let (column_sql, column_type, inner_joins) = if remaining.is_empty() {
        (
            format!(
                "{}.{}",
                quote_identifier(&child_table),
                quote_identifier("id")
            ),
            Some(FieldType::Id),
            Vec::new(),
        )
    } else {
        let inner_request = ResolveRequest {
            schema: request.schema,
            model: child,
            context: request.context,
            inputs: request.inputs,
            strategy: RelationStrategy::Joins {
                base_alias: child_table.clone(),
            },
        };
        let resolved =
            resolve_model_path(&inner_request, child, child_table.clone(), remaining, path)?;
        let column_sql = match &resolved.operand {
            QueryOperand::Column { table, column } => format!(
                "{}.{}",
                quote_identifier(table),
                quote_identifier(column)
            ),
            _ => return Err(unresolved(path)),
        };
        (column_sql, resolved.field_type, resolved.joins)
    };

    let mut strip_prefix = vec![path[0].clone()];
    strip_prefix.extend(fragments[..=index].iter().cloned());

    Ok(AggregateTarget {
        outer_joins,
        child: Some(AggregateChild {
            model_name: child_name,
            table: child_table,
            correlation,
            inner_joins,
            column_sql,
            strip_prefix,
        }),
        scalar_column: None,
        column_type,
    })
}
