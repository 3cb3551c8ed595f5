//! The incremental query builder.
//!
//! A builder accumulates fragments for one table and renders exactly one
//! terminal statement. Filters are kept as a token stream of SQL
//! fragments interleaved with structural connectives; dangling
//! connectives are trimmed at render time, tolerating a visitor that
//! emits `AND`/`OR` before knowing the chain has ended.

use std::collections::BTreeMap;

use tiller_core::identifiers::quote_identifier;
use tiller_core::Value;

use crate::error::QueryError;
use crate::operand::QueryOperand;
use crate::operator::Operator;
use crate::statement::Statement;

/// A rendered SQL fragment with its bound arguments, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Fragment {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }
}

/// Sort direction for ORDER BY entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// The SQL keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }

    /// The opposite direction, used when paging backwards.
    pub fn reversed(self) -> SortDirection {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// One join clause. Joins compare equal on their full rendering, which
/// makes [`QueryBuilder::join`] idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// The joined table.
    pub table: String,
    /// Alias the joined table is referenced through.
    pub alias: String,
    /// The ON condition, pre-rendered with quoted identifiers.
    pub on: String,
}

impl Join {
    /// A left join of `table` under `alias`.
    pub fn left(table: impl Into<String>, alias: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            on: on.into(),
        }
    }

    fn render(&self) -> String {
        if self.alias == self.table {
            format!("LEFT JOIN {} ON {}", quote_identifier(&self.table), self.on)
        } else {
            format!(
                "LEFT JOIN {} AS {} ON {}",
                quote_identifier(&self.table),
                quote_identifier(&self.alias),
                self.on
            )
        }
    }

    fn render_table(&self) -> String {
        if self.alias == self.table {
            quote_identifier(&self.table)
        } else {
            format!(
                "{} AS {}",
                quote_identifier(&self.table),
                quote_identifier(&self.alias)
            )
        }
    }
}

/// Tokens of the filter stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterToken {
    Condition(Fragment),
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Accumulates the parts of one statement against one table.
///
/// A builder is mutated only through its own methods and consumed by
/// exactly one terminal render call.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    table: String,
    selection: Vec<String>,
    distinct_on: Vec<String>,
    joins: Vec<Join>,
    filters: Vec<FilterToken>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    returning: Vec<String>,
    write_values: BTreeMap<String, QueryOperand>,
}

impl QueryBuilder {
    /// A builder bound to the given table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// The table this builder targets.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Whether any filter condition has been added.
    pub fn has_filters(&self) -> bool {
        self.filters
            .iter()
            .any(|t| matches!(t, FilterToken::Condition(_)))
    }

    /// Select a column. Duplicate selections are kept once.
    pub fn select_column(&mut self, table: &str, column: &str) {
        let rendered = format!("{}.{}", quote_identifier(table), quote_identifier(column));
        self.select_raw(rendered);
    }

    /// Select a pre-rendered expression. Duplicates are kept once.
    pub fn select_raw(&mut self, expression: impl Into<String>) {
        let expression = expression.into();
        if !self.selection.contains(&expression) {
            self.selection.push(expression);
        }
    }

    /// Select every column of the base table.
    pub fn select_all(&mut self) {
        let rendered = format!("{}.*", quote_identifier(&self.table));
        self.select_raw(rendered);
    }

    /// Add a DISTINCT ON column.
    pub fn distinct_on(&mut self, table: &str, column: &str) {
        let rendered = format!("{}.{}", quote_identifier(table), quote_identifier(column));
        if !self.distinct_on.contains(&rendered) {
            self.distinct_on.push(rendered);
        }
    }

    /// Add a join. Adding the same clause twice yields one join.
    pub fn join(&mut self, join: Join) {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
    }

    /// Add a comparison condition from the operator table.
    pub fn where_(
        &mut self,
        lhs: QueryOperand,
        op: Operator,
        rhs: QueryOperand,
    ) -> Result<(), QueryError> {
        let fragment = condition_fragment(&lhs, op, &rhs)?;
        self.filters.push(FilterToken::Condition(fragment));
        Ok(())
    }

    /// Add a pre-rendered condition with its arguments.
    pub fn where_raw(&mut self, sql: impl Into<String>, args: Vec<Value>) {
        self.filters.push(FilterToken::Condition(Fragment {
            sql: sql.into(),
            args,
        }));
    }

    /// Push an AND connective.
    pub fn and(&mut self) {
        self.filters.push(FilterToken::And);
    }

    /// Push an OR connective.
    pub fn or(&mut self) {
        self.filters.push(FilterToken::Or);
    }

    /// Push a NOT.
    pub fn not(&mut self) {
        self.filters.push(FilterToken::Not);
    }

    /// Open a filter group.
    pub fn open_parenthesis(&mut self) {
        self.filters.push(FilterToken::Open);
    }

    /// Close a filter group.
    pub fn close_parenthesis(&mut self) {
        self.filters.push(FilterToken::Close);
    }

    /// Append an ORDER BY entry.
    pub fn order_by(&mut self, table: &str, column: &str, direction: SortDirection) {
        self.order_by.push(format!(
            "{}.{} {}",
            quote_identifier(table),
            quote_identifier(column),
            direction.as_sql()
        ));
    }

    /// Set the LIMIT; rendered as a placeholder.
    pub fn limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    /// Set the OFFSET; rendered as a placeholder.
    pub fn offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    /// Return every column of the base table from a mutation.
    pub fn returning_all(&mut self) {
        let rendered = format!("{}.*", quote_identifier(&self.table));
        if !self.returning.contains(&rendered) {
            self.returning.push(rendered);
        }
    }

    /// Return a single column from a mutation.
    pub fn returning_column(&mut self, column: &str) {
        let rendered = quote_identifier(column);
        if !self.returning.contains(&rendered) {
            self.returning.push(rendered);
        }
    }

    /// Append a raw filter token; used by the expression visitors.
    pub(crate) fn push_token(&mut self, token: FilterToken) {
        self.filters.push(token);
    }

    /// Stage a written value for INSERT / UPDATE.
    pub fn set_value(&mut self, column: impl Into<String>, operand: QueryOperand) {
        self.write_values.insert(column.into(), operand);
    }

    /// Whether any write value has been staged.
    pub fn has_write_values(&self) -> bool {
        !self.write_values.is_empty()
    }

    // -------------------------------------------------------------------
    // Terminal renderers
    // -------------------------------------------------------------------

    /// Render a SELECT statement.
    pub fn select_statement(self) -> Result<Statement, QueryError> {
        let parts = self.render_select_parts()?;
        tracing::debug!(sql = %parts.sql, "generated select statement");
        Ok(Statement::new(parts.sql, parts.args))
    }

    /// Render an INSERT statement.
    pub fn insert_statement(self) -> Result<Statement, QueryError> {
        if self.write_values.is_empty() {
            return Err(QueryError::MalformedStatement {
                reason: "insert with no written values".to_string(),
            });
        }

        let mut args = Vec::new();
        let mut columns = Vec::new();
        let mut values = Vec::new();
        // Write values render sorted by column name for determinism.
        for (column, operand) in &self.write_values {
            let fragment = operand.render()?;
            columns.push(quote_identifier(column));
            values.push(fragment.sql);
            args.extend(fragment.args);
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            columns.join(", "),
            values.join(", ")
        );
        if !self.returning.is_empty() {
            sql.push_str(&format!(" RETURNING {}", self.returning.join(", ")));
        }

        tracing::debug!(sql = %sql, "generated insert statement");
        Ok(Statement::new(sql, args))
    }

    /// Render an UPDATE statement.
    ///
    /// Joins become a `FROM` list with their ON conditions folded into
    /// the WHERE clause, so filters may reference related tables.
    pub fn update_statement(self) -> Result<Statement, QueryError> {
        if self.write_values.is_empty() {
            return Err(QueryError::MalformedStatement {
                reason: "update with no written values".to_string(),
            });
        }

        let mut args = Vec::new();
        let mut assignments = Vec::new();
        for (column, operand) in &self.write_values {
            let fragment = operand.render()?;
            assignments.push(format!("{} = {}", quote_identifier(column), fragment.sql));
            args.extend(fragment.args);
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_identifier(&self.table),
            assignments.join(", ")
        );

        if !self.joins.is_empty() {
            let tables: Vec<String> = self.joins.iter().map(Join::render_table).collect();
            sql.push_str(&format!(" FROM {}", tables.join(", ")));
        }

        let where_clause = self.render_where_with_join_conditions()?;
        if !where_clause.sql.is_empty() {
            sql.push_str(&format!(" WHERE {}", where_clause.sql));
            args.extend(where_clause.args);
        }

        if !self.returning.is_empty() {
            sql.push_str(&format!(" RETURNING {}", self.returning.join(", ")));
        }

        tracing::debug!(sql = %sql, "generated update statement");
        Ok(Statement::new(sql, args))
    }

    /// Render a DELETE statement, with a USING clause when a filter
    /// touches a related table.
    pub fn delete_statement(self) -> Result<Statement, QueryError> {
        let mut sql = format!("DELETE FROM {}", quote_identifier(&self.table));
        let mut args = Vec::new();

        if !self.joins.is_empty() {
            let tables: Vec<String> = self.joins.iter().map(Join::render_table).collect();
            sql.push_str(&format!(" USING {}", tables.join(", ")));
        }

        let where_clause = self.render_where_with_join_conditions()?;
        if !where_clause.sql.is_empty() {
            sql.push_str(&format!(" WHERE {}", where_clause.sql));
            args.extend(where_clause.args);
        }

        if !self.returning.is_empty() {
            sql.push_str(&format!(" RETURNING {}", self.returning.join(", ")));
        }

        tracing::debug!(sql = %sql, "generated delete statement");
        Ok(Statement::new(sql, args))
    }

    /// Render the SELECT parts without consuming the builder; used by
    /// the terminal renderer and by inline subquery operands.
    pub(crate) fn render_select_parts(&self) -> Result<Fragment, QueryError> {
        let mut sql = String::from("SELECT ");
        let mut args = Vec::new();

        if !self.distinct_on.is_empty() {
            sql.push_str(&format!("DISTINCT ON({}) ", self.distinct_on.join(", ")));
        }

        if self.selection.is_empty() {
            sql.push_str(&format!("{}.*", quote_identifier(&self.table)));
        } else {
            sql.push_str(&self.selection.join(", "));
        }

        sql.push_str(&format!(" FROM {}", quote_identifier(&self.table)));

        for join in &self.joins {
            sql.push_str(&format!(" {}", join.render()));
        }

        let filters = render_filters(&self.filters)?;
        if !filters.sql.is_empty() {
            sql.push_str(&format!(" WHERE {}", filters.sql));
            args.extend(filters.args);
        }

        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            args.push(Value::Int(limit as i64));
        }

        if let Some(offset) = self.offset {
            sql.push_str(" OFFSET ?");
            args.push(Value::Int(offset as i64));
        }

        Ok(Fragment { sql, args })
    }

    /// WHERE rendering for UPDATE / DELETE: join ON conditions come
    /// first, AND-ed ahead of the filter stream.
    fn render_where_with_join_conditions(&self) -> Result<Fragment, QueryError> {
        let filters = render_filters(&self.filters)?;

        if self.joins.is_empty() {
            return Ok(filters);
        }

        let ons: Vec<String> = self.joins.iter().map(|j| j.on.clone()).collect();
        let mut sql = ons.join(" AND ");
        if !filters.sql.is_empty() {
            sql.push_str(&format!(" AND {}", filters.sql));
        }
        Ok(Fragment {
            sql,
            args: filters.args,
        })
    }
}

/// Render a single comparison condition from the fixed operator table.
pub(crate) fn condition_fragment(
    lhs: &QueryOperand,
    op: Operator,
    rhs: &QueryOperand,
) -> Result<Fragment, QueryError> {
    let left = lhs.render()?;

    match op {
        Operator::Equals | Operator::NotEquals => {
            let keyword = if op == Operator::Equals {
                "IS NOT DISTINCT FROM"
            } else {
                "IS DISTINCT FROM"
            };
            let right = rhs.render()?;
            let mut args = left.args;
            args.extend(right.args);
            Ok(Fragment {
                sql: format!("{} {} {}", left.sql, keyword, right.sql),
                args,
            })
        }

        Operator::StartsWith | Operator::EndsWith | Operator::Contains => {
            let text = match rhs {
                QueryOperand::Value(Value::String(s)) => s,
                other => {
                    return Err(QueryError::OperandMismatch {
                        operator: format!("{:?}", op),
                        operand: other.describe(),
                    })
                }
            };
            let escaped = escape_like(text);
            let pattern = match op {
                Operator::StartsWith => format!("{}%", escaped),
                Operator::EndsWith => format!("%{}", escaped),
                _ => format!("%{}%", escaped),
            };
            let mut args = left.args;
            args.push(Value::String(pattern));
            Ok(Fragment {
                sql: format!("{} LIKE ?", left.sql),
                args,
            })
        }

        Operator::OneOf | Operator::NotOneOf => {
            let keyword = if op == Operator::OneOf { "IN" } else { "NOT IN" };
            match rhs {
                QueryOperand::Value(Value::List(items)) => {
                    if items.is_empty() {
                        // An empty list matches no row (or every row for
                        // the negation) without generating invalid SQL.
                        let sql = if op == Operator::OneOf { "1 = 0" } else { "1 = 1" };
                        return Ok(Fragment::raw(sql));
                    }
                    let placeholders = vec!["?"; items.len()].join(", ");
                    let mut args = left.args;
                    args.extend(items.iter().cloned());
                    Ok(Fragment {
                        sql: format!("{} {} ({})", left.sql, keyword, placeholders),
                        args,
                    })
                }
                QueryOperand::InlineQuery { .. } => {
                    let right = rhs.render()?;
                    let mut args = left.args;
                    args.extend(right.args);
                    Ok(Fragment {
                        sql: format!("{} {} {}", left.sql, keyword, right.sql),
                        args,
                    })
                }
                QueryOperand::Raw(sql) => {
                    let args = left.args;
                    Ok(Fragment {
                        sql: format!("{} {} ({})", left.sql, keyword, sql),
                        args,
                    })
                }
                other => Err(QueryError::OperandMismatch {
                    operator: format!("{:?}", op),
                    operand: other.describe(),
                }),
            }
        }

        other => {
            let symbol = other.ordering_symbol().ok_or(QueryError::OperandMismatch {
                operator: format!("{:?}", other),
                operand: lhs.describe(),
            })?;
            let right = rhs.render()?;
            let mut args = left.args;
            args.extend(right.args);
            Ok(Fragment {
                sql: format!("{} {} {}", left.sql, symbol, right.sql),
                args,
            })
        }
    }
}

/// Escape LIKE metacharacters in a literal; backslash is the Postgres
/// default escape character.
fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Render the filter token stream, trimming dangling connectives.
fn render_filters(tokens: &[FilterToken]) -> Result<Fragment, QueryError> {
    let kept = trim_connectives(tokens);

    let mut sql = String::new();
    let mut args = Vec::new();

    for token in &kept {
        match token {
            FilterToken::Condition(fragment) => {
                push_word(&mut sql, &fragment.sql);
                args.extend(fragment.args.iter().cloned());
            }
            FilterToken::And => push_word(&mut sql, "AND"),
            FilterToken::Or => push_word(&mut sql, "OR"),
            FilterToken::Not => push_word(&mut sql, "NOT"),
            FilterToken::Open => {
                if !sql.is_empty() && !sql.ends_with('(') {
                    sql.push(' ');
                }
                sql.push('(');
            }
            FilterToken::Close => sql.push(')'),
        }
    }

    Ok(Fragment { sql, args })
}

fn push_word(sql: &mut String, word: &str) {
    if !sql.is_empty() && !sql.ends_with('(') {
        sql.push(' ');
    }
    sql.push_str(word);
}

/// Drop connectives that would render dangling: a leading/trailing
/// `AND`/`OR`, one directly inside a group boundary, or one stacked on
/// another connective. Empty groups collapse away entirely.
fn trim_connectives(tokens: &[FilterToken]) -> Vec<FilterToken> {
    // Forward: a connective must follow a condition or a closing paren.
    let mut forward: Vec<FilterToken> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            FilterToken::And | FilterToken::Or => {
                let ok = matches!(
                    forward.last(),
                    Some(FilterToken::Condition(_)) | Some(FilterToken::Close)
                );
                if ok {
                    forward.push(token.clone());
                }
            }
            other => forward.push(other.clone()),
        }
    }

    // Backward: a connective must precede a condition, a NOT or an
    // opening paren.
    let mut backward: Vec<FilterToken> = Vec::with_capacity(forward.len());
    for token in forward.into_iter().rev() {
        match token {
            FilterToken::And | FilterToken::Or => {
                let ok = matches!(
                    backward.last(),
                    Some(FilterToken::Condition(_))
                        | Some(FilterToken::Open)
                        | Some(FilterToken::Not)
                );
                if ok {
                    backward.push(token);
                }
            }
            other => backward.push(other),
        }
    }
    backward.reverse();

    // Collapse empty groups left over from trimming.
    let mut result = backward;
    loop {
        let mut collapsed = Vec::with_capacity(result.len());
        let mut changed = false;
        let mut i = 0;
        while i < result.len() {
            if matches!(result[i], FilterToken::Open)
                && matches!(result.get(i + 1), Some(FilterToken::Close))
            {
                changed = true;
                i += 2;
            } else {
                collapsed.push(result[i].clone());
                i += 1;
            }
        }
        result = collapsed;
        if !changed {
            break;
        }
    }
    result
}
