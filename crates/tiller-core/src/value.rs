//! The typed value union.
//!
//! Request payloads and database rows are carried as [`Value`]s past the
//! request boundary. JSON is coerced here exactly once; malformed
//! date/time operands surface as [`ValueError`] immediately.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// A tagged scalar, list or record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Null,
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

/// Errors coercing boundary payloads into values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    /// A timestamp string did not parse as RFC 3339.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A date string did not parse as YYYY-MM-DD.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// A value had the wrong shape for its declared type.
    #[error("expected {expected} but got {got}")]
    TypeMismatch { expected: String, got: String },
}

impl Value {
    /// Coerce an untyped JSON payload into a value.
    ///
    /// Numbers become `Int` when integral, `Float` otherwise. Strings
    /// stay strings; typed date/time coercion happens against a field
    /// type via [`Value::coerce`].
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Coerce a JSON payload against a declared field type.
    ///
    /// Timestamps accept RFC 3339 strings; dates accept `YYYY-MM-DD`.
    /// Everything else defers to [`Value::from_json`] with a shape check.
    pub fn coerce(
        json: &serde_json::Value,
        field_type: &crate::schema::FieldType,
    ) -> Result<Value, ValueError> {
        use crate::schema::FieldType;

        if json.is_null() {
            return Ok(Value::Null);
        }

        match field_type {
            FieldType::Timestamp => {
                let s = json.as_str().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "timestamp string".to_string(),
                    got: json_kind(json),
                })?;
                let parsed = DateTime::parse_from_rfc3339(s)
                    .map_err(|_| ValueError::InvalidTimestamp(s.to_string()))?;
                Ok(Value::Timestamp(parsed.with_timezone(&Utc)))
            }
            FieldType::Date => {
                let s = json.as_str().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "date string".to_string(),
                    got: json_kind(json),
                })?;
                let parsed = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| ValueError::InvalidDate(s.to_string()))?;
                Ok(Value::Date(parsed))
            }
            FieldType::Int => json
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| ValueError::TypeMismatch {
                    expected: "integer".to_string(),
                    got: json_kind(json),
                }),
            FieldType::Decimal => json
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| ValueError::TypeMismatch {
                    expected: "number".to_string(),
                    got: json_kind(json),
                }),
            FieldType::Boolean => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| ValueError::TypeMismatch {
                    expected: "boolean".to_string(),
                    got: json_kind(json),
                }),
            _ => Ok(Value::from_json(json)),
        }
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer content, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The boolean content, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The record content, if this is a record.
    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(map) => Some(map),
            _ => None,
        }
    }

    /// The list content, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render back to JSON for the response boundary.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::Null => serde_json::Value::Null,
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_string()
}
