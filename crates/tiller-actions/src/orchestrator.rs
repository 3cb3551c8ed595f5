//! The action orchestrator.

use std::sync::Arc;

use tiller_core::ActionType;
use tiller_query::Scope;

use crate::config::EngineConfig;
use crate::error::ActionError;
use crate::files::FileResolver;
use crate::input;
use crate::result::ActionResult;

/// Sequences query construction, authorization, execution and
/// post-processing for every action type.
///
/// Configuration is injected here, at construction; the engine keeps no
/// package-level mutable state.
pub struct Orchestrator {
    pub(crate) config: EngineConfig,
    file_resolver: Option<Arc<dyn FileResolver>>,
}

impl Orchestrator {
    /// An orchestrator with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            file_resolver: None,
        }
    }

    /// Attach a file resolver for hydrating stored file references.
    pub fn with_file_resolver(mut self, resolver: Arc<dyn FileResolver>) -> Self {
        self.file_resolver = Some(resolver);
        self
    }

    pub(crate) fn resolver(&self) -> Option<&dyn FileResolver> {
        self.file_resolver.as_deref()
    }

    /// Execute the scoped action against a raw request payload.
    ///
    /// The payload crosses the typed boundary here and is a value
    /// record from this point on.
    pub async fn execute(
        &self,
        scope: &Scope<'_>,
        payload: &serde_json::Value,
    ) -> Result<ActionResult, ActionError> {
        let inputs = input::decode_inputs(scope, payload)?;
        tracing::debug!(action = %scope.action.name, "executing action");

        match scope.action.action_type {
            ActionType::Get => self.execute_get(scope, &inputs).await,
            ActionType::List => self.execute_list(scope, &inputs).await,
            ActionType::Create => self.execute_create(scope, &inputs).await,
            ActionType::Update => self.execute_update(scope, &inputs).await,
            ActionType::Delete => self.execute_delete(scope, &inputs).await,
        }
    }
}
