//! Per-request scope.

use tiller_core::{Action, Model, RequestContext, Schema};

use crate::database::Database;

/// The per-request bundle the engine compiles against: context, schema,
/// the targeted model and action, and the database handle.
///
/// A scope lives for exactly one request and is never shared across
/// requests.
pub struct Scope<'a> {
    pub context: &'a RequestContext,
    pub schema: &'a Schema,
    pub model: &'a Model,
    pub action: &'a Action,
    pub database: &'a dyn Database,
}

impl<'a> Scope<'a> {
    /// Assemble a scope for one request.
    pub fn new(
        context: &'a RequestContext,
        schema: &'a Schema,
        model: &'a Model,
        action: &'a Action,
        database: &'a dyn Database,
    ) -> Self {
        Self {
            context,
            schema,
            model,
            action,
            database,
        }
    }

    /// The table backing the scoped model.
    pub fn table_name(&self) -> String {
        self.model.table_name()
    }
}
