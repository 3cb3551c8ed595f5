//! Query compilation for Tiller.
//!
//! This crate turns schema-level intent into parameterized Postgres
//! statements:
//! - [`QueryBuilder`] accumulates selection, joins, filters, ordering
//!   and write values for one table, then renders exactly one terminal
//!   [`Statement`].
//! - The expression visitors compile `@where` / `@permission` / `@set`
//!   sources into builder fragments, joins or correlated subqueries.
//! - [`Database`] is the narrow async seam to the SQL driver; the
//!   engine issues at most two round-trips per action through it.

pub mod builder;
pub mod database;
pub mod error;
pub mod expression;
pub mod operand;
pub mod operator;
pub mod scope;
pub mod statement;

pub use builder::{Join, QueryBuilder, SortDirection};
pub use database::{Database, DatabaseError, Row};
pub use error::QueryError;
pub use operand::QueryOperand;
pub use operator::Operator;
pub use scope::Scope;
pub use statement::Statement;
