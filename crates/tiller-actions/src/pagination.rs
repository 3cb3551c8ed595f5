//! Page-parameter arithmetic.

use tiller_core::{Record, Value};

use crate::error::ActionError;

/// Parsed page parameters. Cursor mode (`first`/`last`/`after`/
/// `before`) and offset mode (`offset`/`limit`) are mutually exclusive
/// by construction: offset mode is selected iff `limit > 0`, and the
/// cursor fields are otherwise ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Page {
    /// Extract page parameters from request arguments. With none
    /// supplied, cursor mode with `first = default_first` applies.
    pub fn parse(args: &Record, default_first: u64) -> Result<Page, ActionError> {
        let mut page = Page {
            first: unsigned(args, "first")?,
            last: unsigned(args, "last")?,
            after: text(args, "after"),
            before: text(args, "before"),
            offset: unsigned(args, "offset")?,
            limit: unsigned(args, "limit")?,
        };

        if page.first.is_none() && page.last.is_none() && !page.is_offset() {
            page.first = Some(default_first);
        }
        Ok(page)
    }

    /// Whether offset mode is active.
    pub fn is_offset(&self) -> bool {
        self.limit.unwrap_or(0) > 0
    }

    /// Whether the page walks backwards through the cursor order.
    pub fn is_backwards(&self) -> bool {
        !self.is_offset() && self.before.is_some() && self.last.unwrap_or(0) > 0
    }

    /// The LIMIT to render: the offset-mode limit, else `last` when
    /// paging backwards, else `first`.
    pub fn limit(&self) -> u64 {
        if self.is_offset() {
            return self.limit.unwrap_or(0);
        }
        if self.is_backwards() {
            return self.last.unwrap_or(0);
        }
        self.first.unwrap_or(0)
    }

    /// The OFFSET to render in offset mode.
    pub fn offset(&self) -> u64 {
        if self.is_offset() {
            self.offset.unwrap_or(0)
        } else {
            0
        }
    }
}

fn unsigned(args: &Record, key: &str) -> Result<Option<u64>, ActionError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Int(i)) if *i >= 0 => Ok(Some(*i as u64)),
        Some(other) => Err(ActionError::InputValidation(format!(
            "page argument '{}' must be a non-negative integer, got {:?}",
            key, other
        ))),
    }
}

fn text(args: &Record, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn no_arguments_defaults_to_cursor_mode_first_50() {
        let page = Page::parse(&Record::new(), 50).unwrap();
        assert!(!page.is_offset());
        assert_eq!(page.first, Some(50));
        assert_eq!(page.limit(), 50);
    }

    #[test]
    fn positive_limit_always_selects_offset_mode() {
        let args = record(&[
            ("limit", Value::Int(10)),
            ("offset", Value::Int(30)),
            ("first", Value::Int(5)),
        ]);
        let page = Page::parse(&args, 50).unwrap();
        assert!(page.is_offset());
        assert_eq!(page.limit(), 10);
        assert_eq!(page.offset(), 30);
    }

    #[test]
    fn zero_limit_is_ignored() {
        let args = record(&[("limit", Value::Int(0))]);
        let page = Page::parse(&args, 50).unwrap();
        assert!(!page.is_offset());
        assert_eq!(page.first, Some(50));
    }

    #[test]
    fn backward_paging_uses_last() {
        let args = record(&[
            ("last", Value::Int(2)),
            ("before", Value::String("123".to_string())),
        ]);
        let page = Page::parse(&args, 50).unwrap();
        assert!(page.is_backwards());
        assert_eq!(page.limit(), 2);
    }

    #[test]
    fn last_without_before_pages_forward() {
        let args = record(&[("last", Value::Int(2))]);
        let page = Page::parse(&args, 50).unwrap();
        assert!(!page.is_backwards());
        assert_eq!(page.limit(), 0);
    }

    #[test]
    fn negative_page_argument_is_rejected() {
        let args = record(&[("first", Value::Int(-1))]);
        assert!(matches!(
            Page::parse(&args, 50),
            Err(ActionError::InputValidation(_))
        ));
    }
}
