//! Per-action orchestration.
//!
//! Every action follows the same shape: build a query for the entity's
//! table, apply implicit then explicit filters, resolve permissions
//! (in memory first, with at most one probe), finalize projection and
//! paging, render exactly one statement, execute it, and post-process
//! the result. The [`Orchestrator`] owns the engine configuration -
//! injected at construction, never package-level state - and dispatches
//! on the action type.

mod config;
mod create;
mod delete;
mod error;
mod files;
mod filters;
mod get;
mod input;
mod list;
mod orchestrator;
mod pagination;
mod result;
mod update;

pub use config::EngineConfig;
pub use error::ActionError;
pub use files::FileResolver;
pub use orchestrator::Orchestrator;
pub use pagination::Page;
pub use result::{ActionResult, PageInfo};

pub use tiller_query::Scope;
