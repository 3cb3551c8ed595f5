//! Permission resolution.
//!
//! Deciding whether a caller may see or mutate the targeted rows is a
//! two-phase process: everything that can be answered in memory is
//! answered there (role allowlists, pure context expressions), and only
//! what genuinely depends on row data costs a database round-trip - at
//! most one, combining every remaining predicate.

mod error;
mod eval;
mod resolver;

pub use error::AuthError;
pub use resolver::{append_permission_predicates, authorise, resolve_in_memory};
