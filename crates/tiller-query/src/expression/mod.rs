//! Expression-to-SQL compilation.
//!
//! One generic visitor ([`SqlVisitor`]) walks expression trees and
//! produces either filter conditions on a [`QueryBuilder`] or a
//! standalone SQL expression string. It is parameterized by a
//! relationship strategy - LEFT JOINs for filters and permissions,
//! correlated subqueries for computed fields and `ctx` backlinks - and
//! by a literal-embedding mode (bound placeholders vs inline text for
//! statically stored expressions).

mod ident;
mod set;
mod visitor;

pub use set::resolve_assignment;
pub use visitor::SqlVisitor;

pub(crate) use ident::{resolve_ident, ResolveRequest};

use tiller_core::{Record, Value};
use tiller_expr::parse_expression;

use crate::builder::QueryBuilder;
use crate::error::QueryError;
use crate::scope::Scope;

/// How relationship hops are compiled.
#[derive(Debug, Clone)]
pub enum RelationStrategy {
    /// LEFT JOIN per hop, aliased by path. Used for `@where` and
    /// `@permission` filters; duplicated rows are collapsed by the
    /// action's `DISTINCT ON` projection.
    Joins { base_alias: String },
    /// Correlated scalar subqueries against a fixed row alias. Used for
    /// computed fields, where a join would multiply rows under a
    /// per-row scalar expression.
    Correlated { row_alias: String },
}

/// Compile one `@where` / `@permission` source onto a builder.
pub fn apply_expression(
    query: &mut QueryBuilder,
    scope: &Scope<'_>,
    inputs: &Record,
    source: &str,
) -> Result<(), QueryError> {
    let expr = parse_expression(source)?;
    let mut visitor = SqlVisitor::filters(scope, inputs, query.table_name().to_string());
    tiller_expr::walk(&expr, &mut visitor)?;
    visitor.apply_to(query)
}

/// Compile several sources onto a builder, AND-ed in order.
pub fn apply_expressions(
    query: &mut QueryBuilder,
    scope: &Scope<'_>,
    inputs: &Record,
    sources: &[String],
) -> Result<(), QueryError> {
    for source in sources {
        query.and();
        apply_expression(query, scope, inputs, source)?;
    }
    Ok(())
}

/// Apply one AND-ed equality per implicit read input that has a
/// matching request argument.
///
/// Targets of the form `[relation, "id"]` on a belongs-to edge compare
/// the foreign key column directly, with no join.
pub fn apply_implicit_filters(
    query: &mut QueryBuilder,
    scope: &Scope<'_>,
    inputs: &Record,
) -> Result<(), QueryError> {
    use tiller_core::identifiers::to_snake_case;
    use tiller_core::{InputBehaviour, InputMode};

    for input in &scope.action.inputs {
        if input.mode != InputMode::Read || input.behaviour != InputBehaviour::Implicit {
            continue;
        }
        let Some(value) = inputs.get(&input.name) else {
            continue;
        };

        let operand = match input.target.as_slice() {
            [relation, key] if key == "id" => {
                let field = scope
                    .model
                    .field(relation)
                    .ok_or_else(|| QueryError::SchemaResolution {
                        path: input.target.join("."),
                    })?;
                match field.foreign_key_field_name.as_deref() {
                    Some(fk) => {
                        crate::operand::QueryOperand::column(scope.table_name(), to_snake_case(fk))
                    }
                    None => resolve_target(scope, inputs, &input.target, query)?,
                }
            }
            _ => resolve_target(scope, inputs, &input.target, query)?,
        };

        query.and();
        query.where_(
            operand,
            crate::operator::Operator::Equals,
            crate::operand::QueryOperand::value(value.clone()),
        )?;
    }
    Ok(())
}

fn resolve_target(
    scope: &Scope<'_>,
    inputs: &Record,
    target: &[String],
    query: &mut QueryBuilder,
) -> Result<crate::operand::QueryOperand, QueryError> {
    let mut path = vec![scope.model.name.clone()];
    path.extend(target.iter().cloned());
    let request = ResolveRequest {
        schema: scope.schema,
        model: scope.model,
        context: scope.context,
        inputs,
        strategy: RelationStrategy::Joins {
            base_alias: scope.table_name(),
        },
    };
    let resolved = resolve_ident(&request, &path)?;
    for join in resolved.joins {
        query.join(join);
    }
    Ok(resolved.operand)
}

/// Compile a computed-field source into a standalone SQL expression
/// against the fixed row alias `r`, with literals inlined so the result
/// can be stored statically.
pub fn computed_expression(
    scope: &Scope<'_>,
    source: &str,
) -> Result<(String, Vec<Value>), QueryError> {
    let expr = parse_expression(source)?;
    let empty = Record::new();
    let mut visitor = SqlVisitor::computed(scope, &empty, "r".to_string());
    tiller_expr::walk(&expr, &mut visitor)?;
    visitor.into_expression()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tiller_core::{
        Action, ActionType, Field, FieldType, Identity, Model, RequestContext, Schema, Value,
    };

    use crate::database::{Database, DatabaseError, Row};
    use crate::QueryBuilder;

    /// A database handle for statement-generation tests; any call is a
    /// test failure.
    struct NoDatabase;

    #[async_trait]
    impl Database for NoDatabase {
        async fn execute(&self, _sql: &str, _args: &[Value]) -> Result<u64, DatabaseError> {
            panic!("no database call expected in this test");
        }
        async fn execute_to_single(
            &self,
            _sql: &str,
            _args: &[Value],
        ) -> Result<Option<Row>, DatabaseError> {
            panic!("no database call expected in this test");
        }
        async fn execute_to_many(
            &self,
            _sql: &str,
            _args: &[Value],
        ) -> Result<(Vec<Row>, u64), DatabaseError> {
            panic!("no database call expected in this test");
        }
    }

    fn belongs_to(name: &str, model: &str) -> Field {
        Field {
            name: name.to_string(),
            field_type: FieldType::Model(model.to_string()),
            repeated: false,
            optional: false,
            foreign_key_field_name: Some(format!("{}Id", name)),
        }
    }

    fn has_many(name: &str, model: &str) -> Field {
        Field {
            name: name.to_string(),
            field_type: FieldType::Model(model.to_string()),
            repeated: true,
            optional: false,
            foreign_key_field_name: None,
        }
    }

    fn fixture_schema() -> Schema {
        let mut schema = Schema::new();

        let mut thing = Model::new("Thing");
        thing.fields.push(Field::new("id", FieldType::Id));
        thing.fields.push(Field::new("isActive", FieldType::Boolean));
        thing.fields.push(Field::new("age", FieldType::Int));
        thing.fields.push(Field::new("name", FieldType::Text));
        thing.fields.push(belongs_to("owner", "Customer"));
        schema.add_model(thing);

        let mut order = Model::new("Order");
        order.fields.push(Field::new("id", FieldType::Id));
        order.fields.push(belongs_to("customer", "Customer"));
        order.fields.push(has_many("items", "OrderItem"));
        schema.add_model(order);

        let mut customer = Model::new("Customer");
        customer.fields.push(Field::new("id", FieldType::Id));
        customer.fields.push(Field::new("name", FieldType::Text));
        schema.add_model(customer);

        let mut item = Model::new("OrderItem");
        item.fields.push(Field::new("id", FieldType::Id));
        item.fields.push(Field::new("price", FieldType::Decimal));
        item.fields.push(Field::new("quantity", FieldType::Int));
        item.fields.push(Field::new("paid", FieldType::Boolean));
        item.fields.push(belongs_to("order", "Order"));
        schema.add_model(item);

        schema
    }

    fn dummy_action() -> Action {
        Action {
            name: "test".to_string(),
            action_type: ActionType::Get,
            inputs: vec![],
            where_expressions: vec![],
            set_expressions: vec![],
            permissions: vec![],
        }
    }

    fn authenticated_context() -> RequestContext {
        RequestContext::authenticated(
            Identity {
                id: "ident_1".to_string(),
                email: "sam@example.com".to_string(),
                email_verified: true,
                issuer: "tiller".to_string(),
            },
            chrono::Utc::now(),
        )
    }

    fn compile(model_name: &str, source: &str) -> crate::Statement {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model(model_name).unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);

        let mut query = QueryBuilder::new(model.table_name());
        let inputs = Record::new();
        apply_expression(&mut query, &scope, &inputs, source).unwrap();
        query.select_statement().unwrap()
    }

    #[test]
    fn simple_comparison_binds_literal() {
        let statement = compile("Thing", "thing.isActive == true");
        assert_eq!(
            statement.template(),
            "SELECT \"thing\".* FROM \"thing\" WHERE \"thing\".\"is_active\" IS NOT DISTINCT FROM ?"
        );
        assert_eq!(statement.args(), &[Value::Bool(true)]);
    }

    #[test]
    fn in_list_renders_placeholders() {
        let statement = compile("Thing", "thing.age in [10, 20]");
        assert_eq!(
            statement.template(),
            "SELECT \"thing\".* FROM \"thing\" WHERE \"thing\".\"age\" IN (?, ?)"
        );
        assert_eq!(statement.args(), &[Value::Int(10), Value::Int(20)]);
    }

    #[test]
    fn relationship_hop_adds_left_join() {
        let statement = compile("Order", "order.customer.name == \"sam\"");
        assert_eq!(
            statement.template(),
            "SELECT \"order\".* FROM \"order\" \
             LEFT JOIN \"customer\" AS \"order$customer\" ON \"order\".\"customer_id\" IS NOT DISTINCT FROM \"order$customer\".\"id\" \
             WHERE \"order$customer\".\"name\" IS NOT DISTINCT FROM ?"
        );
    }

    #[test]
    fn repeated_hop_joins_once() {
        let statement = compile(
            "Order",
            "order.customer.name == \"sam\" and order.customer.name != \"alex\"",
        );
        assert_eq!(statement.template().matches("LEFT JOIN").count(), 1);
    }

    #[test]
    fn terminal_belongs_to_compares_foreign_key() {
        let statement = compile("Thing", "thing.owner in [ctx.identity.id]");
        assert_eq!(
            statement.template(),
            "SELECT \"thing\".* FROM \"thing\" WHERE \"thing\".\"owner_id\" IN (?)"
        );
        assert_eq!(statement.args(), &[Value::String("ident_1".to_string())]);
    }

    #[test]
    fn bare_context_flag_promotes_to_condition() {
        let statement = compile("Thing", "ctx.isAuthenticated");
        assert_eq!(
            statement.template(),
            "SELECT \"thing\".* FROM \"thing\" WHERE ? IS NOT DISTINCT FROM true"
        );
        assert_eq!(statement.args(), &[Value::Bool(true)]);
    }

    #[test]
    fn grouped_or_keeps_parentheses() {
        let statement = compile(
            "Thing",
            "(thing.age < 10 or thing.age > 20) and thing.isActive == true",
        );
        assert_eq!(
            statement.template(),
            "SELECT \"thing\".* FROM \"thing\" WHERE (\"thing\".\"age\" < ? OR \"thing\".\"age\" > ?) AND \"thing\".\"is_active\" IS NOT DISTINCT FROM ?"
        );
    }

    #[test]
    fn aggregate_compiles_to_correlated_subquery() {
        let statement = compile("Order", "sum(order.items.price) > 100");
        assert_eq!(
            statement.template(),
            "SELECT \"order\".* FROM \"order\" WHERE \
             (SELECT COALESCE(SUM(\"order_item\".\"price\"), 0) FROM \"order_item\" \
             WHERE \"order_item\".\"order_id\" IS NOT DISTINCT FROM \"order\".\"id\") > ?"
        );
        assert_eq!(statement.args(), &[Value::Int(100)]);
    }

    #[test]
    fn filtered_aggregate_merges_predicate_into_subquery() {
        let statement = compile(
            "Order",
            "sumIf(order.items.price, order.items.paid == true) > 100",
        );
        assert_eq!(
            statement.template(),
            "SELECT \"order\".* FROM \"order\" WHERE \
             (SELECT COALESCE(SUM(\"order_item\".\"price\"), 0) FROM \"order_item\" \
             WHERE \"order_item\".\"order_id\" IS NOT DISTINCT FROM \"order\".\"id\" \
             AND \"order_item\".\"paid\" IS NOT DISTINCT FROM ?) > ?"
        );
        assert_eq!(statement.args(), &[Value::Bool(true), Value::Int(100)]);
    }

    #[test]
    fn median_renders_percentile() {
        let statement = compile("Order", "median(order.items.price) > 5");
        assert!(statement
            .template()
            .contains("PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY \"order_item\".\"price\")"));
    }

    #[test]
    fn unsupported_function_is_rejected() {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model("Order").unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);
        let mut query = QueryBuilder::new(model.table_name());
        let inputs = Record::new();
        let err = apply_expression(&mut query, &scope, &inputs, "mystery(order.items.price) > 1")
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedFunction { .. }));
    }

    #[test]
    fn computed_expression_uses_row_alias() {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model("OrderItem").unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);

        let (sql, args) =
            computed_expression(&scope, "orderItem.price * orderItem.quantity").unwrap();
        assert_eq!(sql, "\"r\".\"price\" * \"r\".\"quantity\"");
        assert!(args.is_empty());
    }

    #[test]
    fn computed_string_concatenation_renders_double_pipe() {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model("Customer").unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);

        let (sql, _) = computed_expression(&scope, "customer.name + \"!\"").unwrap();
        assert_eq!(sql, "\"r\".\"name\" || '!'");
    }

    #[test]
    fn computed_scalar_lookup_is_correlated() {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model("Order").unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);

        let (sql, _) = computed_expression(&scope, "order.customer.name").unwrap();
        assert_eq!(
            sql,
            "(SELECT \"customer\".\"name\" FROM \"customer\" WHERE \"customer\".\"id\" IS NOT DISTINCT FROM \"r\".\"customer_id\")"
        );
    }

    #[test]
    fn set_assignment_resolves_context_value() {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model("Thing").unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);

        let inputs = Record::new();
        let (column, operand) =
            resolve_assignment(&scope, &inputs, "thing.ownerId = ctx.identity.id").unwrap();
        assert_eq!(column, "owner_id");
        assert!(matches!(
            operand,
            crate::QueryOperand::Value(Value::String(ref id)) if id == "ident_1"
        ));
    }

    #[test]
    fn set_assignment_compiles_arithmetic() {
        let schema = fixture_schema();
        let context = authenticated_context();
        let action = dummy_action();
        let model = schema.model("OrderItem").unwrap();
        let db = NoDatabase;
        let scope = Scope::new(&context, &schema, model, &action, &db);

        let inputs = Record::new();
        let (column, operand) =
            resolve_assignment(&scope, &inputs, "orderItem.quantity = orderItem.quantity + 1")
                .unwrap();
        assert_eq!(column, "quantity");
        match operand {
            crate::QueryOperand::Raw(sql) => {
                assert_eq!(sql, "\"order_item\".\"quantity\" + 1");
            }
            other => panic!("expected raw operand, got {:?}", other),
        }
    }
}
