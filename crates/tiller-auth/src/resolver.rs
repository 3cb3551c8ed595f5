//! The two-phase authorization resolver.
//!
//! Resolution order is fixed and must stay fixed:
//! 1. no rules - deny;
//! 2. role allowlists against the authenticated identity - allow with
//!    zero database work;
//! 3. no expression rules left - deny;
//! 4. in-memory evaluation of pure expression rules - first true
//!    allows, and denial requires every disjunct known false;
//! 5. one combined SQL probe over the candidate rows.
//!
//! Always querying the database would be equally correct but breaks the
//! latency budget this ordering exists to protect.

use tiller_core::{PermissionRule, Record, Role, Value};
use tiller_expr::parse_expression;
use tiller_query::expression::{apply_expression, apply_implicit_filters};
use tiller_query::{QueryBuilder, QueryOperand, Row, Scope};

use crate::error::AuthError;
use crate::eval;

/// Decide whether the caller may proceed against the candidate rows.
///
/// Returns `Ok(false)` for a denial; errors are reserved for broken
/// queries and driver failures.
///
/// The probe compares only the distinct-id *count* against the
/// candidate count, never the id sets themselves; if a different row
/// were excluded than expected while the counts coincided, this check
/// would not notice. Known weakness, kept deliberately.
pub async fn authorise(
    scope: &Scope<'_>,
    inputs: &Record,
    rows: &[Row],
) -> Result<bool, AuthError> {
    if let Some(decision) = resolve_in_memory(scope)? {
        return Ok(decision);
    }

    // Phase two: one probe ORing every expression predicate, restricted
    // to the candidate ids.
    let candidate_ids = candidate_ids(scope, rows)?;
    if candidate_ids.is_empty() {
        return Ok(true);
    }

    let table = scope.table_name();
    let mut query = QueryBuilder::new(table.clone());
    query.distinct_on(&table, "id");
    query.select_column(&table, "id");

    apply_implicit_filters(&mut query, scope, inputs)?;
    append_permission_predicates(&mut query, scope, inputs)?;

    query.and();
    query.where_(
        QueryOperand::column(&table, "id"),
        tiller_query::Operator::OneOf,
        QueryOperand::value(Value::List(candidate_ids.clone())),
    )?;

    let statement = query.select_statement()?;
    let (satisfied, _) = statement.execute_to_many(scope.database).await?;

    // Authorized iff every candidate row satisfied at least one
    // predicate.
    Ok(satisfied.len() == candidate_ids.len())
}

/// The in-memory phases of resolution.
///
/// Returns a decisive `Some(allow)` when no database work is needed:
/// no rules at all, a role-allowlist match, a pure expression known
/// true, or every expression known false. `None` means the decision
/// depends on row data and requires the probe.
pub fn resolve_in_memory(scope: &Scope<'_>) -> Result<Option<bool>, AuthError> {
    let rules = &scope.action.permissions;

    // An action with no permission rules is denied for every input.
    if rules.is_empty() {
        tracing::debug!(action = %scope.action.name, "no permission rules; denying");
        return Ok(Some(false));
    }

    if let Some(identity) = &scope.context.identity {
        for rule in rules {
            let PermissionRule::Roles(roles) = rule else {
                continue;
            };
            if roles.iter().any(|role| role_matches(role, identity)) {
                tracing::debug!(action = %scope.action.name, "role rule matched; allowing");
                return Ok(Some(true));
            }
        }
    }

    let sources: Vec<&str> = scope.action.permission_expressions().collect();
    if sources.is_empty() {
        return Ok(Some(false));
    }

    // Pure expressions resolve without touching the database. OR
    // semantics across rules: any true allows, and a denial needs every
    // disjunct known false.
    let mut all_false = true;
    for source in &sources {
        let expr = parse_expression(source).map_err(tiller_query::QueryError::from)?;
        match eval::try_bool(&expr, scope.context) {
            Some(true) => {
                tracing::debug!(action = %scope.action.name, "permission resolved in memory; allowing");
                return Ok(Some(true));
            }
            Some(false) => {}
            None => all_false = false,
        }
    }
    if all_false {
        tracing::debug!(action = %scope.action.name, "every permission known false; denying");
        return Ok(Some(false));
    }

    Ok(None)
}

/// AND one parenthesized group ORing every expression-based permission
/// predicate onto a builder. List actions fold this into their single
/// combined statement; the probe uses it with an id restriction.
pub fn append_permission_predicates(
    query: &mut QueryBuilder,
    scope: &Scope<'_>,
    inputs: &Record,
) -> Result<(), AuthError> {
    let sources: Vec<&str> = scope.action.permission_expressions().collect();
    if sources.is_empty() {
        return Ok(());
    }

    query.and();
    query.open_parenthesis();
    for (index, source) in sources.iter().enumerate() {
        if index > 0 {
            query.or();
        }
        query.open_parenthesis();
        apply_expression(query, scope, inputs, source)?;
        query.close_parenthesis();
    }
    query.close_parenthesis();
    Ok(())
}

/// Distinct primary keys of the candidate rows.
fn candidate_ids(scope: &Scope<'_>, rows: &[Row]) -> Result<Vec<Value>, AuthError> {
    let pk = scope.model.primary_key_field_name();
    let mut ids: Vec<Value> = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.get(pk).ok_or(AuthError::MissingPrimaryKey)?;
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    Ok(ids)
}

/// Whether an allowlist role admits the identity. Matches require a
/// verified email; entries may carry `*` wildcards.
fn role_matches(role: &Role, identity: &tiller_core::Identity) -> bool {
    if !identity.email_verified {
        return false;
    }
    if role
        .emails
        .iter()
        .any(|entry| entry_matches(entry, &identity.email))
    {
        return true;
    }
    if let Some(domain) = identity.email_domain() {
        return role.domains.iter().any(|entry| entry_matches(entry, domain));
    }
    false
}

fn entry_matches(entry: &str, value: &str) -> bool {
    if !entry.contains('*') {
        return entry.eq_ignore_ascii_case(value);
    }
    let pattern = format!("^{}$", regex::escape(entry).replace("\\*", ".*"));
    match regex::RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(value),
        Err(_) => {
            tracing::warn!(entry, "invalid allowlist pattern");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tiller_core::{
        Action, ActionType, Field, FieldType, Identity, Input, Model, RequestContext, Schema,
    };
    use tiller_query::{Database, DatabaseError};

    /// Counts calls and replays a fixed result set.
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
            Ok(0)
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

    fn schema_with_permissions(permissions: Vec<PermissionRule>) -> Schema {
        let mut schema = Schema::new();
        let mut thing = Model::new("Thing");
        thing.fields.push(Field::new("id", FieldType::Id));
        thing.fields.push(Field::new("isActive", FieldType::Boolean));
        thing.actions.push(Action {
            name: "getThing".to_string(),
            action_type: ActionType::Get,
            inputs: vec![Input::implicit_read("id")],
            where_expressions: vec![],
            set_expressions: vec![],
            permissions,
        });
        schema.add_model(thing);
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

    fn row(id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.to_string()));
        row
    }

    async fn run(
        permissions: Vec<PermissionRule>,
        context: RequestContext,
        database: &MockDatabase,
        rows: &[Row],
    ) -> Result<bool, AuthError> {
        let schema = schema_with_permissions(permissions);
        let (model, action) = schema.action("getThing").unwrap();
        let scope = Scope::new(&context, &schema, model, action, database);
        let inputs = Record::new();
        authorise(&scope, &inputs, rows).await
    }

    #[tokio::test]
    async fn zero_rules_denies_every_input() {
        let db = MockDatabase::none();
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let allowed = run(vec![], context, &db, &[row("1")]).await.unwrap();
        assert!(!allowed);
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn role_email_match_allows_without_queries() {
        let db = MockDatabase::none();
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let rules = vec![PermissionRule::Roles(vec![Role {
            name: "Admin".to_string(),
            emails: vec!["sam@example.com".to_string()],
            domains: vec![],
        }])];
        let allowed = run(rules, context, &db, &[row("1")]).await.unwrap();
        assert!(allowed);
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn role_domain_match_allows() {
        let db = MockDatabase::none();
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let rules = vec![PermissionRule::Roles(vec![Role {
            name: "Staff".to_string(),
            emails: vec![],
            domains: vec!["example.com".to_string()],
        }])];
        assert!(run(rules, context, &db, &[row("1")]).await.unwrap());
    }

    #[tokio::test]
    async fn unverified_email_does_not_match_roles() {
        let db = MockDatabase::none();
        let mut unverified = identity();
        unverified.email_verified = false;
        let context = RequestContext::authenticated(unverified, chrono::Utc::now());
        let rules = vec![PermissionRule::Roles(vec![Role {
            name: "Admin".to_string(),
            emails: vec!["sam@example.com".to_string()],
            domains: vec![],
        }])];
        assert!(!run(rules, context, &db, &[row("1")]).await.unwrap());
    }

    #[tokio::test]
    async fn context_expression_resolves_in_memory() {
        let db = MockDatabase::none();
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let rules = vec![PermissionRule::Expression(
            "ctx.isAuthenticated".to_string(),
        )];
        let allowed = run(rules, context, &db, &[row("1")]).await.unwrap();
        assert!(allowed);
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn known_false_expressions_deny_without_queries() {
        let db = MockDatabase::none();
        let context = RequestContext::anonymous(chrono::Utc::now());
        let rules = vec![
            PermissionRule::Expression("ctx.isAuthenticated".to_string()),
            PermissionRule::Expression("false".to_string()),
        ];
        let allowed = run(rules, context, &db, &[row("1")]).await.unwrap();
        assert!(!allowed);
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn probe_allows_when_counts_match() {
        let db = MockDatabase::with_rows(vec![row("1"), row("2")]);
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let rules = vec![PermissionRule::Expression(
            "thing.isActive == true".to_string(),
        )];
        let allowed = run(rules, context, &db, &[row("1"), row("2")]).await.unwrap();
        assert!(allowed);
        assert_eq!(db.call_count(), 1);
    }

    #[tokio::test]
    async fn probe_denies_when_a_row_fails_every_predicate() {
        let db = MockDatabase::with_rows(vec![row("1")]);
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let rules = vec![PermissionRule::Expression(
            "thing.isActive == true".to_string(),
        )];
        let allowed = run(rules, context, &db, &[row("1"), row("2")]).await.unwrap();
        assert!(!allowed);
        assert_eq!(db.call_count(), 1);
    }

    #[tokio::test]
    async fn candidate_row_without_primary_key_is_a_contract_breach() {
        let db = MockDatabase::none();
        let context = RequestContext::authenticated(identity(), chrono::Utc::now());
        let rules = vec![PermissionRule::Expression(
            "thing.isActive == true".to_string(),
        )];
        let result = run(rules, context, &db, &[Row::new()]).await;
        assert!(matches!(result, Err(AuthError::MissingPrimaryKey)));
    }
}
