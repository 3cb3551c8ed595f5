//! Action results.

use tiller_core::Value;
use tiller_query::Row;

/// The typed result of one executed action.
#[derive(Debug, Clone)]
pub enum ActionResult {
    /// The matched row, if any.
    Get(Option<Row>),
    /// A page of rows with relay-style page info.
    List { rows: Vec<Row>, page_info: PageInfo },
    /// The created row.
    Create(Row),
    /// The updated row.
    Update(Row),
    /// The primary key of the deleted row.
    Delete(Value),
}

/// Relay-style pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    /// Whether more rows follow the returned page.
    pub has_next_page: bool,
    /// Total rows matching the filters, ignoring the page bounds.
    pub total_count: u64,
    /// Primary key of the first returned row.
    pub start_cursor: Option<String>,
    /// Primary key of the last returned row.
    pub end_cursor: Option<String>,
    /// Rows in the returned page.
    pub count: u64,
}

impl PageInfo {
    pub(crate) fn from_rows(rows: &[Row], total_count: u64, offset: u64) -> Self {
        let count = rows.len() as u64;
        let cursor = |row: &Row| -> Option<String> {
            row.get("id").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Int(i) => Some(i.to_string()),
                _ => None,
            })
        };
        Self {
            has_next_page: offset + count < total_count,
            total_count,
            start_cursor: rows.first().and_then(cursor),
            end_cursor: rows.last().and_then(cursor),
            count,
        }
    }
}
