//! The generic expression visitor.
//!
//! Driven by the walker in `tiller-expr`, this visitor renders SQL in
//! two output modes: filter conditions destined for a [`QueryBuilder`],
//! or one standalone expression string (computed fields). Relationship
//! traversal follows the configured [`RelationStrategy`], and literals
//! bind as placeholders or inline as text depending on the mode.
//!
//! Aggregate calls (`sum`, `count`, `avg`, `median`, `min`, `max` and
//! their `*If` filtered variants) over a to-many path compile into a
//! correlated scalar subquery. The predicate argument of a filtered
//! aggregate is compiled by a nested instance of this same visitor,
//! rooted at the child model with the identifier prefix stripped, and
//! its joins merged into the subquery.

use tiller_core::{FieldType, Record, Value};
use tiller_expr::{BinaryOp, Visitor};

use crate::builder::{condition_fragment, FilterToken, Fragment, Join, QueryBuilder};
use crate::error::QueryError;
use crate::expression::ident::{
    resolve_aggregate_target, resolve_ident, ResolveRequest,
};
use crate::expression::RelationStrategy;
use crate::operand::QueryOperand;
use crate::operator::Operator;
use crate::scope::Scope;

const AGGREGATES: &[&str] = &["sum", "count", "avg", "median", "min", "max"];

fn aggregate_base(name: &str) -> Option<&str> {
    let base = name.strip_suffix("If").unwrap_or(name);
    AGGREGATES.contains(&base).then_some(base)
}

fn aggregate_sql(base: &str, column: &str) -> String {
    match base {
        "median" => format!(
            "COALESCE(PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY {}), 0)",
            column
        ),
        other => format!("COALESCE({}({}), 0)", other.to_uppercase(), column),
    }
}

/// Output mode: builder filter tokens or a standalone expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Conditions for a WHERE clause; bare operands promote to boolean
    /// conditions.
    Filters,
    /// A scalar expression string; bare operands stay as they are.
    Expression,
}

/// One in-progress term.
#[derive(Default)]
struct Frame {
    parts: Vec<FramePart>,
}

enum FramePart {
    /// An unrendered operand with its statically known type.
    Operand(QueryOperand, Option<FieldType>),
    /// An operator between operands.
    Op(BinaryOp),
    /// A completed sub-term. The operand is kept when the term was a
    /// single bare operand, so a boolean chain can still promote it.
    Term(Fragment, Option<FieldType>, Option<QueryOperand>),
    And,
    Or,
    Not,
}

/// State of an aggregate call being captured.
struct AggregateState<'a> {
    name: String,
    /// Resolved target; set by the first identifier event.
    target: Option<crate::expression::ident::AggregateTarget>,
    /// Nested visitor compiling the predicate argument of a filtered
    /// aggregate against the child model.
    inner: Option<Box<SqlVisitor<'a>>>,
    /// Depth of functions opened inside this aggregate.
    depth: usize,
}

/// The generic expression-to-SQL visitor. See the module docs.
pub struct SqlVisitor<'a> {
    request: ResolveRequest<'a>,
    mode: Mode,
    inline_literals: bool,
    /// Identifier prefix rewritten to the visitor's root model; used by
    /// nested aggregate-predicate visitors.
    strip_prefix: Option<Vec<String>>,
    joins: Vec<Join>,
    tokens: Vec<FilterToken>,
    frames: Vec<Frame>,
    aggregate: Option<AggregateState<'a>>,
}

impl<'a> SqlVisitor<'a> {
    /// A filter/permission visitor: LEFT JOIN traversal, bound literals.
    pub fn filters(scope: &Scope<'a>, inputs: &'a Record, base_alias: String) -> Self {
        Self {
            request: ResolveRequest {
                schema: scope.schema,
                model: scope.model,
                context: scope.context,
                inputs,
                strategy: RelationStrategy::Joins { base_alias },
            },
            mode: Mode::Filters,
            inline_literals: false,
            strip_prefix: None,
            joins: Vec::new(),
            tokens: Vec::new(),
            frames: Vec::new(),
            aggregate: None,
        }
    }

    /// A computed-field visitor: correlated subqueries against a fixed
    /// row alias, literals inlined for static storage.
    pub fn computed(scope: &Scope<'a>, inputs: &'a Record, row_alias: String) -> Self {
        Self {
            request: ResolveRequest {
                schema: scope.schema,
                model: scope.model,
                context: scope.context,
                inputs,
                strategy: RelationStrategy::Correlated { row_alias },
            },
            mode: Mode::Expression,
            inline_literals: true,
            strip_prefix: None,
            joins: Vec::new(),
            tokens: Vec::new(),
            frames: Vec::new(),
            aggregate: None,
        }
    }

    /// Pour accumulated joins and filter tokens into a builder.
    pub fn apply_to(self, query: &mut QueryBuilder) -> Result<(), QueryError> {
        if !self.frames.is_empty() || self.aggregate.is_some() {
            return Err(QueryError::MalformedTerm {
                reason: "expression walk ended mid-term".to_string(),
            });
        }
        for join in self.joins {
            query.join(join);
        }
        for token in self.tokens {
            query.push_token(token);
        }
        Ok(())
    }

    /// Render the accumulated tokens as one standalone expression.
    pub fn into_expression(self) -> Result<(String, Vec<Value>), QueryError> {
        if !self.frames.is_empty() || self.aggregate.is_some() {
            return Err(QueryError::MalformedTerm {
                reason: "expression walk ended mid-term".to_string(),
            });
        }
        let mut sql = String::new();
        let mut args = Vec::new();
        for token in &self.tokens {
            match token {
                FilterToken::Condition(fragment) => {
                    push_word(&mut sql, &fragment.sql);
                    args.extend(fragment.args.iter().cloned());
                }
                FilterToken::And => push_word(&mut sql, "AND"),
                FilterToken::Or => push_word(&mut sql, "OR"),
                FilterToken::Not => push_word(&mut sql, "NOT"),
                FilterToken::Open => sql.push('('),
                FilterToken::Close => sql.push(')'),
            }
        }
        Ok((sql, args))
    }

    fn nested_for_child(
        &self,
        child_model_name: &str,
        child_table: String,
        strip_prefix: Vec<String>,
    ) -> Result<SqlVisitor<'a>, QueryError> {
        let child = self
            .request
            .schema
            .model(child_model_name)
            .ok_or_else(|| QueryError::SchemaResolution {
                path: child_model_name.to_string(),
            })?;
        Ok(SqlVisitor {
            request: ResolveRequest {
                schema: self.request.schema,
                model: child,
                context: self.request.context,
                inputs: self.request.inputs,
                strategy: RelationStrategy::Joins {
                    base_alias: child_table,
                },
            },
            mode: Mode::Filters,
            inline_literals: self.inline_literals,
            strip_prefix: Some(strip_prefix),
            joins: Vec::new(),
            tokens: Vec::new(),
            frames: Vec::new(),
            aggregate: None,
        })
    }

    /// Rewrite a rebased identifier path to the visitor's root model.
    fn rebase_path(&self, path: &[String]) -> Vec<String> {
        if let Some(prefix) = &self.strip_prefix {
            if path.len() > prefix.len() && path.starts_with(prefix.as_slice()) {
                let mut rebased = vec![self.request.model.name.clone()];
                rebased.extend(path[prefix.len()..].iter().cloned());
                return rebased;
            }
        }
        path.to_vec()
    }

    fn current_frame(&mut self) -> Result<&mut Frame, QueryError> {
        self.frames.last_mut().ok_or_else(|| QueryError::MalformedTerm {
            reason: "operand outside a term".to_string(),
        })
    }

    fn push_operand(
        &mut self,
        operand: QueryOperand,
        field_type: Option<FieldType>,
    ) -> Result<(), QueryError> {
        self.current_frame()?
            .parts
            .push(FramePart::Operand(operand, field_type));
        Ok(())
    }

    /// Complete the active aggregate into an inline-subquery operand.
    fn finish_aggregate(&mut self, state: AggregateState<'a>) -> Result<(), QueryError> {
        let base = aggregate_base(&state.name).ok_or_else(|| QueryError::UnsupportedFunction {
            name: state.name.clone(),
        })?;
        let target = state.target.ok_or_else(|| QueryError::MalformedTerm {
            reason: format!("aggregate {} without a target identifier", state.name),
        })?;

        self.joins.extend(target.outer_joins.iter().cloned());

        let Some(child) = target.child else {
            // No to-many traversal: aggregate the column in place.
            let column = target.scalar_column.ok_or_else(|| QueryError::MalformedTerm {
                reason: format!("aggregate {} over an unresolvable path", state.name),
            })?;
            let sql = aggregate_sql(base, &column);
            return self.push_operand(QueryOperand::Raw(sql), target.column_type);
        };

        let mut query = QueryBuilder::new(child.table.clone());
        query.select_raw(aggregate_sql(base, &child.column_sql));
        for join in child.inner_joins {
            query.join(join);
        }
        query.where_raw(child.correlation.clone(), Vec::new());

        // Merge the filtered variant's predicate, compiled against the
        // child model; its joins deduplicate with the base path's.
        if let Some(inner) = state.inner {
            if !inner.frames.is_empty() || inner.aggregate.is_some() {
                return Err(QueryError::MalformedTerm {
                    reason: "aggregate predicate ended mid-term".to_string(),
                });
            }
            for join in inner.joins {
                query.join(join);
            }
            if !inner.tokens.is_empty() {
                query.and();
                for token in inner.tokens {
                    query.push_token(token);
                }
            }
        }

        let field = aggregate_sql(base, &child.column_sql);
        let column_type = match base {
            "count" => Some(FieldType::Int),
            _ => target.column_type,
        };
        self.push_operand(
            QueryOperand::InlineQuery {
                query: Box::new(query),
                field,
            },
            column_type,
        )
    }

    /// Render a value part to a fragment plus a text-typedness flag.
    fn render_part(part: &FramePart) -> Result<(Fragment, bool), QueryError> {
        match part {
            FramePart::Operand(operand, field_type) => {
                let textish = field_type.as_ref().map(FieldType::is_text).unwrap_or(false)
                    || matches!(operand, QueryOperand::Value(Value::String(_)));
                Ok((operand.render()?, textish))
            }
            FramePart::Term(fragment, field_type, _) => {
                let textish = field_type.as_ref().map(FieldType::is_text).unwrap_or(false);
                Ok((fragment.clone(), textish))
            }
            _ => Err(QueryError::MalformedTerm {
                reason: "operator in operand position".to_string(),
            }),
        }
    }

    /// A bare operand standing as a condition.
    fn boolean_condition(operand: &QueryOperand) -> Result<Fragment, QueryError> {
        condition_fragment(operand, Operator::Equals, &QueryOperand::Raw("true".to_string()))
    }

    fn render_comparison(
        lhs: &FramePart,
        op: BinaryOp,
        rhs: &FramePart,
    ) -> Result<Fragment, QueryError> {
        // IN takes its right-hand side unrendered: a bound list, a
        // subquery, or a pre-rendered identifier tuple.
        if matches!(op, BinaryOp::In | BinaryOp::NotIn) {
            let keyword = if op == BinaryOp::In { "IN" } else { "NOT IN" };
            let (left, _) = Self::render_part(lhs)?;
            return match rhs {
                FramePart::Operand(operand @ QueryOperand::Value(Value::List(_)), _)
                | FramePart::Operand(operand @ QueryOperand::InlineQuery { .. }, _) => {
                    let operator = if op == BinaryOp::In {
                        Operator::OneOf
                    } else {
                        Operator::NotOneOf
                    };
                    let lhs_operand = QueryOperand::Raw(left.sql.clone());
                    let fragment = condition_fragment(&lhs_operand, operator, operand)?;
                    let mut args = left.args;
                    args.extend(fragment.args);
                    Ok(Fragment {
                        sql: fragment.sql,
                        args,
                    })
                }
                FramePart::Term(fragment, _, _) => {
                    let mut args = left.args;
                    args.extend(fragment.args.iter().cloned());
                    Ok(Fragment {
                        sql: format!("{} {} {}", left.sql, keyword, fragment.sql),
                        args,
                    })
                }
                other => Err(QueryError::OperandMismatch {
                    operator: format!("{:?}", op),
                    operand: match other {
                        FramePart::Operand(operand, _) => operand.describe(),
                        _ => "expression".to_string(),
                    },
                }),
            };
        }

        // Two plain operands route through the operator table directly.
        if let (FramePart::Operand(left, _), FramePart::Operand(right, _)) = (lhs, rhs) {
            return condition_fragment(left, Operator::from_binary(op)?, right);
        }

        let (left, _) = Self::render_part(lhs)?;
        let (right, _) = Self::render_part(rhs)?;
        let mut args = left.args;
        args.extend(right.args);

        let sql = match op {
            BinaryOp::Equals => format!("{} IS NOT DISTINCT FROM {}", left.sql, right.sql),
            BinaryOp::NotEquals => format!("{} IS DISTINCT FROM {}", left.sql, right.sql),
            BinaryOp::LessThan => format!("{} < {}", left.sql, right.sql),
            BinaryOp::LessThanOrEquals => format!("{} <= {}", left.sql, right.sql),
            BinaryOp::GreaterThan => format!("{} > {}", left.sql, right.sql),
            BinaryOp::GreaterThanOrEquals => format!("{} >= {}", left.sql, right.sql),
            other => {
                return Err(QueryError::OperandMismatch {
                    operator: format!("{:?}", other),
                    operand: "a comparison".to_string(),
                })
            }
        };
        Ok(Fragment { sql, args })
    }

    fn render_arithmetic(
        lhs: &FramePart,
        op: BinaryOp,
        rhs: &FramePart,
    ) -> Result<(Fragment, Option<FieldType>), QueryError> {
        let (left, left_text) = Self::render_part(lhs)?;
        let (right, right_text) = Self::render_part(rhs)?;
        let textual = left_text || right_text;

        // String concatenation: `+` on two text operands renders `||`.
        let symbol = match op {
            BinaryOp::Add if textual => "||",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            other => {
                return Err(QueryError::OperandMismatch {
                    operator: format!("{:?}", other),
                    operand: "an arithmetic expression".to_string(),
                })
            }
        };

        let mut args = left.args;
        args.extend(right.args);
        let field_type = if textual {
            Some(FieldType::Text)
        } else {
            Some(FieldType::Decimal)
        };
        Ok((
            Fragment {
                sql: format!("{} {} {}", left.sql, symbol, right.sql),
                args,
            },
            field_type,
        ))
    }

    /// Render a completed frame. Returns the fragment, its type, and
    /// the original operand when the frame was one bare operand.
    fn render_frame(
        frame: Frame,
        promote: bool,
    ) -> Result<(Fragment, Option<FieldType>, Option<QueryOperand>), QueryError> {
        let has_connective = frame
            .parts
            .iter()
            .any(|p| matches!(p, FramePart::And | FramePart::Or | FramePart::Not));

        if has_connective {
            // A boolean chain: every value part is a condition.
            let mut sql = String::new();
            let mut args = Vec::new();
            for part in &frame.parts {
                match part {
                    FramePart::And => push_word(&mut sql, "AND"),
                    FramePart::Or => push_word(&mut sql, "OR"),
                    FramePart::Not => push_word(&mut sql, "NOT"),
                    FramePart::Op(_) => {
                        return Err(QueryError::MalformedTerm {
                            reason: "operator inside a boolean chain".to_string(),
                        })
                    }
                    FramePart::Operand(operand, _) => {
                        let fragment = Self::boolean_condition(operand)?;
                        push_word(&mut sql, &fragment.sql);
                        args.extend(fragment.args);
                    }
                    FramePart::Term(fragment, _, promotable) => {
                        let fragment = match promotable {
                            Some(operand) => Self::boolean_condition(operand)?,
                            None => fragment.clone(),
                        };
                        push_word(&mut sql, &fragment.sql);
                        args.extend(fragment.args);
                    }
                }
            }
            return Ok((Fragment { sql, args }, Some(FieldType::Boolean), None));
        }

        match frame.parts.as_slice() {
            [FramePart::Operand(operand, field_type)] => {
                if promote {
                    Ok((
                        Self::boolean_condition(operand)?,
                        Some(FieldType::Boolean),
                        None,
                    ))
                } else {
                    Ok((operand.render()?, field_type.clone(), Some(operand.clone())))
                }
            }
            [FramePart::Term(fragment, field_type, promotable)] => {
                if promote {
                    if let Some(operand) = promotable {
                        return Ok((
                            Self::boolean_condition(operand)?,
                            Some(FieldType::Boolean),
                            None,
                        ));
                    }
                }
                Ok((fragment.clone(), field_type.clone(), promotable.clone()))
            }
            [lhs, FramePart::Op(op), rhs] => {
                if op.is_comparison() {
                    let fragment = Self::render_comparison(lhs, *op, rhs)?;
                    Ok((fragment, Some(FieldType::Boolean), None))
                } else {
                    let (fragment, field_type) = Self::render_arithmetic(lhs, *op, rhs)?;
                    Ok((fragment, field_type, None))
                }
            }
            _ => Err(QueryError::MalformedTerm {
                reason: "unexpected term shape".to_string(),
            }),
        }
    }
}

fn push_word(sql: &mut String, word: &str) {
    if !sql.is_empty() && !sql.ends_with('(') {
        sql.push(' ');
    }
    sql.push_str(word);
}

impl<'a> Visitor for SqlVisitor<'a> {
    type Error = QueryError;

    fn start_term(&mut self, nested: bool) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.start_term(nested);
            }
            return Err(QueryError::MalformedTerm {
                reason: "term inside an unfiltered aggregate".to_string(),
            });
        }
        self.frames.push(Frame::default());
        Ok(())
    }

    fn end_term(&mut self, nested: bool) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.end_term(nested);
            }
            return Err(QueryError::MalformedTerm {
                reason: "term inside an unfiltered aggregate".to_string(),
            });
        }

        let frame = self.frames.pop().ok_or_else(|| QueryError::MalformedTerm {
            reason: "term ended before it started".to_string(),
        })?;
        let condition_level = self.frames.is_empty();
        let promote = condition_level && self.mode == Mode::Filters;

        let (mut fragment, field_type, promotable) = Self::render_frame(frame, promote)?;
        if nested {
            fragment.sql = format!("({})", fragment.sql);
        }

        if condition_level {
            self.tokens.push(FilterToken::Condition(fragment));
        } else {
            let promotable = if nested { None } else { promotable };
            self.frames
                .last_mut()
                .expect("parent frame present")
                .parts
                .push(FramePart::Term(fragment, field_type, promotable));
        }
        Ok(())
    }

    fn start_function(&mut self, name: &str) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            state.depth += 1;
            if let Some(inner) = state.inner.as_mut() {
                return inner.start_function(name);
            }
            return Err(QueryError::UnsupportedFunction {
                name: name.to_string(),
            });
        }

        if aggregate_base(name).is_none() {
            return Err(QueryError::UnsupportedFunction {
                name: name.to_string(),
            });
        }
        self.aggregate = Some(AggregateState {
            name: name.to_string(),
            target: None,
            inner: None,
            depth: 0,
        });
        Ok(())
    }

    fn end_function(&mut self, name: &str) -> Result<(), QueryError> {
        let Some(state) = self.aggregate.as_mut() else {
            return Err(QueryError::MalformedTerm {
                reason: format!("function {} ended without starting", name),
            });
        };
        if state.depth > 0 {
            state.depth -= 1;
            if let Some(inner) = state.inner.as_mut() {
                return inner.end_function(name);
            }
            return Ok(());
        }
        let state = self.aggregate.take().expect("aggregate state present");
        self.finish_aggregate(state)
    }

    fn visit_and(&mut self) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.visit_and();
            }
            return Err(QueryError::MalformedTerm {
                reason: "connective inside an unfiltered aggregate".to_string(),
            });
        }
        match self.frames.last_mut() {
            Some(frame) => frame.parts.push(FramePart::And),
            None => self.tokens.push(FilterToken::And),
        }
        Ok(())
    }

    fn visit_or(&mut self) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.visit_or();
            }
            return Err(QueryError::MalformedTerm {
                reason: "connective inside an unfiltered aggregate".to_string(),
            });
        }
        match self.frames.last_mut() {
            Some(frame) => frame.parts.push(FramePart::Or),
            None => self.tokens.push(FilterToken::Or),
        }
        Ok(())
    }

    fn visit_not(&mut self) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.visit_not();
            }
            return Err(QueryError::MalformedTerm {
                reason: "connective inside an unfiltered aggregate".to_string(),
            });
        }
        match self.frames.last_mut() {
            Some(frame) => frame.parts.push(FramePart::Not),
            None => self.tokens.push(FilterToken::Not),
        }
        Ok(())
    }

    fn visit_operator(&mut self, op: BinaryOp) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.visit_operator(op);
            }
            return Err(QueryError::MalformedTerm {
                reason: "operator inside an unfiltered aggregate".to_string(),
            });
        }
        self.current_frame()?.parts.push(FramePart::Op(op));
        Ok(())
    }

    fn visit_literal(&mut self, value: &Value) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.visit_literal(value);
            }
            return Err(QueryError::MalformedTerm {
                reason: "literal inside an unfiltered aggregate".to_string(),
            });
        }

        let field_type = literal_type(value);
        let operand = if self.inline_literals {
            QueryOperand::Raw(literal_sql(value))
        } else {
            QueryOperand::value(value.clone())
        };
        self.push_operand(operand, field_type)
    }

    fn visit_ident(&mut self, path: &[String]) -> Result<(), QueryError> {
        let path = self.rebase_path(path);

        if let Some(mut state) = self.aggregate.take() {
            if state.target.is_none() {
                // The first identifier inside an aggregate is its target.
                let target = resolve_aggregate_target(&self.request, &path)?;
                if state.name.ends_with("If") {
                    if let Some(child) = &target.child {
                        state.inner = Some(Box::new(self.nested_for_child(
                            &child.model_name,
                            child.table.clone(),
                            child.strip_prefix.clone(),
                        )?));
                    }
                }
                state.target = Some(target);
                self.aggregate = Some(state);
                return Ok(());
            }
            let result = match state.inner.as_mut() {
                Some(inner) => inner.visit_ident(&path),
                None => Err(QueryError::MalformedTerm {
                    reason: "identifier inside an unfiltered aggregate".to_string(),
                }),
            };
            self.aggregate = Some(state);
            return result;
        }

        let resolved = resolve_ident(&self.request, &path)?;
        self.joins.extend(resolved.joins);
        // Inline mode stores the expression statically, so context and
        // input values render as text rather than bound placeholders.
        let operand = if self.inline_literals {
            match resolved.operand {
                QueryOperand::Value(value) => QueryOperand::Raw(literal_sql(&value)),
                other => other,
            }
        } else {
            resolved.operand
        };
        self.push_operand(operand, resolved.field_type)
    }

    fn visit_ident_array(&mut self, paths: &[Vec<String>]) -> Result<(), QueryError> {
        if let Some(state) = self.aggregate.as_mut() {
            if let Some(inner) = state.inner.as_mut() {
                return inner.visit_ident_array(paths);
            }
            return Err(QueryError::MalformedTerm {
                reason: "identifier array inside an unfiltered aggregate".to_string(),
            });
        }

        // Render each identifier and combine into one parenthesized
        // tuple, for the right-hand side of IN.
        let mut rendered = Vec::new();
        let mut args = Vec::new();
        for path in paths {
            let path = self.rebase_path(path);
            let resolved = resolve_ident(&self.request, &path)?;
            self.joins.extend(resolved.joins);
            let fragment = resolved.operand.render()?;
            rendered.push(fragment.sql);
            args.extend(fragment.args);
        }
        let fragment = Fragment {
            sql: format!("({})", rendered.join(", ")),
            args,
        };
        self.current_frame()?
            .parts
            .push(FramePart::Term(fragment, None, None));
        Ok(())
    }
}

fn literal_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::String(_) => Some(FieldType::Text),
        Value::Int(_) => Some(FieldType::Int),
        Value::Float(_) => Some(FieldType::Decimal),
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Timestamp(_) => Some(FieldType::Timestamp),
        Value::Date(_) => Some(FieldType::Date),
        _ => None,
    }
}

/// Render a literal as inline SQL text, for statically stored
/// expressions.
fn literal_sql(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Timestamp(ts) => format!("'{}'::timestamptz", ts.to_rfc3339()),
        Value::Date(d) => format!("'{}'::date", d.format("%Y-%m-%d")),
        Value::Null => "NULL".to_string(),
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(literal_sql).collect();
            format!("({})", rendered.join(", "))
        }
        Value::Record(_) => "NULL".to_string(),
    }
}
