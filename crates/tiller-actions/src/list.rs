//! The list action.
//!
//! Candidate rows are not known before execution, so authorization is
//! folded into the single combined statement: the ORed permission
//! predicates are AND-ed onto the filter set when the decision cannot
//! be made in memory.

use tiller_auth::{append_permission_predicates, resolve_in_memory};
use tiller_core::Record;
use tiller_query::expression::apply_expressions;
use tiller_query::{Operator, QueryBuilder, QueryOperand, Scope, SortDirection, Statement};

use crate::error::ActionError;
use crate::files;
use crate::filters::apply_list_filters;
use crate::input;
use crate::orchestrator::Orchestrator;
use crate::pagination::Page;
use crate::result::{ActionResult, PageInfo};

impl Orchestrator {
    fn build_list_query(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<(QueryBuilder, Page), ActionError> {
        let page = Page::parse(inputs, self.config.default_page_size)?;
        let where_inputs = input::sub_record(inputs, "where")?;
        let merged = input::merged_inputs(inputs);

        let table = scope.table_name();
        let mut query = QueryBuilder::new(table.clone());

        apply_list_filters(&mut query, scope, &where_inputs)?;
        apply_expressions(&mut query, scope, &merged, &scope.action.where_expressions)?;

        // Cursor bounds; backward paging reverses the scan direction.
        if !page.is_offset() {
            if let Some(after) = &page.after {
                query.and();
                query.where_(
                    QueryOperand::column(&table, "id"),
                    Operator::GreaterThan,
                    QueryOperand::value(tiller_core::Value::String(after.clone())),
                )?;
            }
            if let Some(before) = &page.before {
                query.and();
                query.where_(
                    QueryOperand::column(&table, "id"),
                    Operator::LessThan,
                    QueryOperand::value(tiller_core::Value::String(before.clone())),
                )?;
            }
        }

        query.distinct_on(&table, "id");
        query.select_all();
        // Window count evaluates before LIMIT, giving the unlimited
        // total in the same round-trip.
        query.select_raw("COUNT(*) OVER() AS \"totalCount\"");

        let mut direction = SortDirection::Ascending;
        if page.is_backwards() {
            direction = direction.reversed();
        }
        query.order_by(&table, "id", direction);
        query.limit(page.limit());
        if page.is_offset() && page.offset() > 0 {
            query.offset(page.offset());
        }

        Ok((query, page))
    }

    /// Render the statement a list action would execute, without the
    /// permission fold.
    pub fn generate_list_statement(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<Statement, ActionError> {
        let (query, _) = self.build_list_query(scope, inputs)?;
        Ok(query.select_statement()?)
    }

    /// Fetch a page of rows, with authorization folded into the single
    /// statement where the decision needs row data.
    pub async fn execute_list(
        &self,
        scope: &Scope<'_>,
        inputs: &Record,
    ) -> Result<ActionResult, ActionError> {
        let decision = resolve_in_memory(scope)?;
        if decision == Some(false) {
            return Err(ActionError::PermissionDenied);
        }

        let (mut query, page) = self.build_list_query(scope, inputs)?;
        if decision.is_none() {
            let merged = input::merged_inputs(inputs);
            append_permission_predicates(&mut query, scope, &merged)?;
        }

        let statement = query.select_statement()?;
        let (mut rows, total_count) = statement.execute_to_many(scope.database).await?;

        // Backward pages scan descending; hand rows back in natural
        // order.
        if page.is_backwards() {
            rows.reverse();
        }

        files::hydrate_rows(scope, self.resolver(), &mut rows).await?;
        let page_info = PageInfo::from_rows(&rows, total_count, page.offset());
        Ok(ActionResult::List { rows, page_info })
    }
}
