//! End-to-end statement generation and execution flows, driven through
//! the per-action generators so no live database is needed.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tiller_actions::{ActionError, ActionResult, EngineConfig, Orchestrator, Scope};
use tiller_core::{
    Action, ActionType, Field, FieldType, Identity, Input, Model, PermissionRule, Record,
    RequestContext, Schema, Value,
};
use tiller_query::{Database, DatabaseError, Row};

/// Replays fixed rows and counts round-trips.
struct MockDatabase {
    rows: Vec<Row>,
    calls: AtomicUsize,
}

impl MockDatabase {
    fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
        }
    }

    fn none() -> Self {
        Self::with_rows(Vec::new())
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn execute(&self, _sql: &str, _args: &[Value]) -> Result<u64, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.len() as u64)
    }
    async fn execute_to_single(
        &self,
        _sql: &str,
        _args: &[Value],
    ) -> Result<Option<Row>, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.first().cloned())
    }
    async fn execute_to_many(
        &self,
        _sql: &str,
        _args: &[Value],
    ) -> Result<(Vec<Row>, u64), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.rows.clone(), self.rows.len() as u64))
    }
}

fn fixture_schema() -> Schema {
    let mut schema = Schema::new();

    let mut thing = Model::new("Thing");
    thing.fields.push(Field::new("id", FieldType::Id));
    thing.fields.push(Field::new("name", FieldType::Text));
    thing.fields.push(Field::new("age", FieldType::Int));
    thing.fields.push(Field::new("isActive", FieldType::Boolean));
    thing.fields.push(Field::new("createdAt", FieldType::Timestamp));
    thing.fields.push(Field::new("updatedAt", FieldType::Timestamp));
    thing.fields.push(Field {
        name: "owner".to_string(),
        field_type: FieldType::Model("Customer".to_string()),
        repeated: false,
        optional: false,
        foreign_key_field_name: Some("ownerId".to_string()),
    });

    thing.actions.push(Action {
        name: "getThing".to_string(),
        action_type: ActionType::Get,
        inputs: vec![Input::implicit_read("id")],
        where_expressions: vec!["thing.isActive == true".to_string()],
        set_expressions: vec![],
        permissions: vec![PermissionRule::Expression("true".to_string())],
    });
    thing.actions.push(Action {
        name: "listThings".to_string(),
        action_type: ActionType::List,
        inputs: vec![],
        where_expressions: vec![],
        set_expressions: vec![],
        permissions: vec![PermissionRule::Expression("ctx.isAuthenticated".to_string())],
    });
    thing.actions.push(Action {
        name: "listThingsByAge".to_string(),
        action_type: ActionType::List,
        inputs: vec![],
        where_expressions: vec!["thing.age in [10, 20]".to_string()],
        set_expressions: vec![],
        permissions: vec![PermissionRule::Expression("true".to_string())],
    });
    thing.actions.push(Action {
        name: "createThing".to_string(),
        action_type: ActionType::Create,
        inputs: vec![Input::implicit_write("name")],
        where_expressions: vec![],
        set_expressions: vec!["thing.ownerId = ctx.identity.id".to_string()],
        permissions: vec![PermissionRule::Expression("ctx.isAuthenticated".to_string())],
    });
    thing.actions.push(Action {
        name: "updateThing".to_string(),
        action_type: ActionType::Update,
        inputs: vec![Input::implicit_read("id"), {
            let mut input = Input::implicit_write("name");
            input.optional = true;
            input
        }],
        where_expressions: vec![],
        set_expressions: vec![],
        permissions: vec![PermissionRule::Expression("true".to_string())],
    });
    thing.actions.push(Action {
        name: "deleteThing".to_string(),
        action_type: ActionType::Delete,
        inputs: vec![Input::implicit_read("id")],
        where_expressions: vec![],
        set_expressions: vec![],
        permissions: vec![PermissionRule::Expression("true".to_string())],
    });
    thing.actions.push(Action {
        name: "getUnprotected".to_string(),
        action_type: ActionType::Get,
        inputs: vec![Input::implicit_read("id")],
        where_expressions: vec![],
        set_expressions: vec![],
        permissions: vec![],
    });
    schema.add_model(thing);

    let mut customer = Model::new("Customer");
    customer.fields.push(Field::new("id", FieldType::Id));
    schema.add_model(customer);

    schema
}

fn identity() -> Identity {
    Identity {
        id: "ident_1".to_string(),
        email: "sam@example.com".to_string(),
        email_verified: true,
        issuer: "tiller".to_string(),
    }
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn thing_row(id: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::String(id.to_string()));
    row.insert("name".to_string(), Value::String("widget".to_string()));
    row
}

#[test]
fn get_statement_combines_implicit_and_explicit_filters() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("getThing").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let inputs = record(&[("id", Value::String("123".to_string()))]);
    let statement = orchestrator.generate_get_statement(&scope, &inputs).unwrap();

    assert_eq!(
        statement.template(),
        "SELECT DISTINCT ON(\"thing\".\"id\") \"thing\".* FROM \"thing\" \
         WHERE \"thing\".\"id\" IS NOT DISTINCT FROM ? AND \"thing\".\"is_active\" IS NOT DISTINCT FROM ?"
    );
    assert_eq!(
        statement.args(),
        &[Value::String("123".to_string()), Value::Bool(true)]
    );
}

#[tokio::test]
async fn context_permission_issues_no_extra_query() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("listThings").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let result = orchestrator
        .execute(&scope, &serde_json::json!({}))
        .await
        .unwrap();
    assert!(matches!(result, ActionResult::List { .. }));
    // One round-trip for the rows; the permission resolved in memory.
    assert_eq!(db.call_count(), 1);
}

#[tokio::test]
async fn unauthenticated_context_permission_denies_with_zero_queries() {
    let schema = fixture_schema();
    let context = RequestContext::anonymous(chrono::Utc::now());
    let (model, action) = schema.action("listThings").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let result = orchestrator.execute(&scope, &serde_json::json!({})).await;
    assert!(matches!(result, Err(ActionError::PermissionDenied)));
    assert_eq!(db.call_count(), 0);
}

#[test]
fn bare_list_defaults_to_first_50() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("listThings").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let statement = orchestrator
        .generate_list_statement(&scope, &Record::new())
        .unwrap();
    assert!(statement
        .template()
        .ends_with("ORDER BY \"thing\".\"id\" ASC LIMIT ?"));
    assert_eq!(statement.args(), &[Value::Int(50)]);
}

#[test]
fn where_in_list_renders_one_placeholder_per_element() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("listThingsByAge").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let statement = orchestrator
        .generate_list_statement(&scope, &Record::new())
        .unwrap();
    assert!(statement
        .template()
        .contains("\"thing\".\"age\" IN (?, ?)"));
    assert_eq!(
        &statement.args()[..2],
        &[Value::Int(10), Value::Int(20)]
    );
}

#[test]
fn backward_cursor_page_reverses_order() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("listThings").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let inputs = record(&[
        ("last", Value::Int(2)),
        ("before", Value::String("123".to_string())),
    ]);
    let statement = orchestrator.generate_list_statement(&scope, &inputs).unwrap();
    assert!(statement
        .template()
        .ends_with("WHERE \"thing\".\"id\" < ? ORDER BY \"thing\".\"id\" DESC LIMIT ?"));
    assert_eq!(
        statement.args(),
        &[Value::String("123".to_string()), Value::Int(2)]
    );
}

#[test]
fn offset_mode_renders_limit_and_offset() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("listThings").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let inputs = record(&[("limit", Value::Int(10)), ("offset", Value::Int(20))]);
    let statement = orchestrator.generate_list_statement(&scope, &inputs).unwrap();
    assert!(statement.template().ends_with("LIMIT ? OFFSET ?"));
    assert_eq!(statement.args(), &[Value::Int(10), Value::Int(20)]);
}

#[test]
fn create_statement_sets_defaults_and_set_expressions() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("createThing").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let inputs = record(&[("name", Value::String("widget".to_string()))]);
    let statement = orchestrator
        .generate_create_statement(&scope, &inputs)
        .unwrap();

    // Columns render sorted by name.
    assert_eq!(
        statement.template(),
        "INSERT INTO \"thing\" (\"created_at\", \"id\", \"name\", \"owner_id\", \"updated_at\") \
         VALUES (?, ?, ?, ?, ?) RETURNING \"thing\".*"
    );
    // The @set expression wrote the caller's identity id.
    assert_eq!(
        statement.args()[3],
        Value::String("ident_1".to_string())
    );
}

#[test]
fn update_statement_writes_values_and_filters_by_where() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("updateThing").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let mut inputs = Record::new();
    inputs.insert(
        "where".to_string(),
        Value::Record(record(&[("id", Value::String("123".to_string()))])),
    );
    inputs.insert(
        "values".to_string(),
        Value::Record(record(&[("name", Value::String("renamed".to_string()))])),
    );
    let statement = orchestrator
        .generate_update_statement(&scope, &inputs)
        .unwrap();

    assert_eq!(
        statement.template(),
        "UPDATE \"thing\" SET \"name\" = ?, \"updated_at\" = ? \
         WHERE \"thing\".\"id\" IS NOT DISTINCT FROM ? RETURNING \"thing\".*"
    );
}

#[test]
fn delete_statement_returns_primary_key() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("deleteThing").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let inputs = record(&[("id", Value::String("123".to_string()))]);
    let statement = orchestrator
        .generate_delete_statement(&scope, &inputs)
        .unwrap();
    assert_eq!(
        statement.template(),
        "DELETE FROM \"thing\" WHERE \"thing\".\"id\" IS NOT DISTINCT FROM ? RETURNING \"id\""
    );
}

#[tokio::test]
async fn zero_permission_rules_deny_before_any_query() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("getUnprotected").unwrap();
    let db = MockDatabase::with_rows(vec![thing_row("123")]);
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let result = orchestrator
        .execute(&scope, &serde_json::json!({"id": "123"}))
        .await;
    assert!(matches!(result, Err(ActionError::PermissionDenied)));
    assert_eq!(db.call_count(), 0);
}

#[tokio::test]
async fn get_returns_row_and_missing_row_is_none() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("getThing").unwrap();
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let db = MockDatabase::with_rows(vec![thing_row("123")]);
    let scope = Scope::new(&context, &schema, model, action, &db);
    let result = orchestrator
        .execute(&scope, &serde_json::json!({"id": "123"}))
        .await
        .unwrap();
    match result {
        ActionResult::Get(Some(row)) => {
            assert_eq!(row.get("id"), Some(&Value::String("123".to_string())));
        }
        other => panic!("expected a row, got {:?}", other),
    }

    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let result = orchestrator
        .execute(&scope, &serde_json::json!({"id": "missing"}))
        .await
        .unwrap();
    assert!(matches!(result, ActionResult::Get(None)));
}

#[tokio::test]
async fn missing_required_argument_is_rejected() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("getThing").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let result = orchestrator.execute(&scope, &serde_json::json!({})).await;
    assert!(matches!(result, Err(ActionError::InputValidation(_))));
}

#[tokio::test]
async fn update_missing_row_reports_record_not_found() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("updateThing").unwrap();
    let db = MockDatabase::none();
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let payload = serde_json::json!({
        "where": {"id": "nope"},
        "values": {"name": "renamed"}
    });
    let result = orchestrator.execute(&scope, &payload).await;
    assert!(matches!(result, Err(ActionError::RecordNotFound)));
}

#[tokio::test]
async fn delete_returns_the_deleted_id() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("deleteThing").unwrap();
    let db = MockDatabase::with_rows(vec![thing_row("123")]);
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let result = orchestrator
        .execute(&scope, &serde_json::json!({"id": "123"}))
        .await
        .unwrap();
    match result {
        ActionResult::Delete(id) => assert_eq!(id, Value::String("123".to_string())),
        other => panic!("expected the deleted id, got {:?}", other),
    }
}

#[tokio::test]
async fn list_page_info_reports_totals() {
    let schema = fixture_schema();
    let context = RequestContext::authenticated(identity(), chrono::Utc::now());
    let (model, action) = schema.action("listThings").unwrap();
    let db = MockDatabase::with_rows(vec![thing_row("1"), thing_row("2")]);
    let scope = Scope::new(&context, &schema, model, action, &db);
    let orchestrator = Orchestrator::new(EngineConfig::default());

    let result = orchestrator
        .execute(&scope, &serde_json::json!({}))
        .await
        .unwrap();
    match result {
        ActionResult::List { rows, page_info } => {
            assert_eq!(rows.len(), 2);
            assert_eq!(page_info.count, 2);
            assert_eq!(page_info.total_count, 2);
            assert!(!page_info.has_next_page);
            assert_eq!(page_info.start_cursor.as_deref(), Some("1"));
            assert_eq!(page_info.end_cursor.as_deref(), Some("2"));
        }
        other => panic!("expected a list page, got {:?}", other),
    }
}
