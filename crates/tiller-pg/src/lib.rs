//! Postgres implementation of the engine's database seam.
//!
//! Converts `?` templates to `$n` placeholders, binds typed values, and
//! decodes rows back into value maps. The adapter never opens
//! transactions; a pool handle may be swapped for a request-scoped
//! connection by the caller.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as SqlxRow};
use tiller_core::Value;
use tiller_query::{Database, DatabaseError, Row};

/// The column name the engine uses to carry a window count alongside
/// list rows.
const TOTAL_COUNT_COLUMN: &str = "totalCount";

/// A `Database` over a sqlx Postgres pool.
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Connect a small pool to the given database URL.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, DatabaseError> {
        let numbered = numbered_placeholders(sql);
        tracing::debug!(sql = %numbered, "executing statement");
        let mut query = sqlx::query(&numbered);
        for arg in args {
            query = bind_value(query, arg);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn execute_to_single(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Row>, DatabaseError> {
        let numbered = numbered_placeholders(sql);
        tracing::debug!(sql = %numbered, "executing single-row query");
        let mut query = sqlx::query(&numbered);
        for arg in args {
            query = bind_value(query, arg);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(e.to_string()))?;
        Ok(row.map(|r| decode_row(&r)))
    }

    async fn execute_to_many(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<(Vec<Row>, u64), DatabaseError> {
        let numbered = numbered_placeholders(sql);
        tracing::debug!(sql = %numbered, "executing many-row query");
        let mut query = sqlx::query(&numbered);
        for arg in args {
            query = bind_value(query, arg);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(e.to_string()))?;

        let mut decoded: Vec<Row> = rows.iter().map(decode_row).collect();

        // Lift the window count out of the rows when present; it is the
        // unlimited total, evaluated before LIMIT applied.
        let total = decoded
            .first()
            .and_then(|row| row.get(TOTAL_COUNT_COLUMN))
            .and_then(Value::as_int)
            .map(|total| total as u64);
        let total = match total {
            Some(total) => {
                for row in &mut decoded {
                    row.remove(TOTAL_COUNT_COLUMN);
                }
                total
            }
            None => decoded.len() as u64,
        };

        Ok((decoded, total))
    }
}

/// Rewrite `?` placeholders to `$1..$n`, leaving quoted identifiers and
/// string literals untouched.
fn numbered_placeholders(sql: &str) -> String {
    let mut result = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut in_single = false;
    let mut in_double = false;

    for c in sql.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                result.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                result.push(c);
            }
            '?' if !in_single && !in_double => {
                index += 1;
                result.push('$');
                result.push_str(&index.to_string());
            }
            other => result.push(other),
        }
    }
    result
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::String(s) => query.bind(s.clone()),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Bool(b) => query.bind(*b),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Date(d) => query.bind(*d),
        Value::Null => query.bind(Option::<String>::None),
        // Lists expand to one placeholder per element before binding;
        // a composite here round-trips through JSON.
        other => query.bind(other.to_json()),
    }
}

/// Decode a Postgres row into a value map, trying the narrow types
/// first and falling back to JSON and text.
fn decode_row(row: &PgRow) -> Row {
    let mut decoded = Row::new();
    for column in row.columns() {
        let name = column.name();
        let value: Value = if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
            v.map(Value::Int).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(name) {
            v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
            v.map(Value::Float).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(name) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
            v.map(Value::Timestamp).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
            v.map(Value::Date).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(name) {
            v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(name) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(name) {
            v.map(|j| Value::from_json(&j)).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        decoded.insert(name.to_string(), value);
    }
    decoded
}
