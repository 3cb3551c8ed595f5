//! Core types shared across all Tiller crates.
//!
//! The schema IR (models, fields, actions, permission rules) is produced
//! by an external schema builder and handed to the engine as immutable
//! descriptors. Request payloads are coerced into the typed [`Value`]
//! union exactly once at the boundary; nothing past that point carries
//! untyped JSON.

pub mod action;
pub mod context;
pub mod identifiers;
pub mod schema;
pub mod value;

pub use action::{Action, ActionType, Input, InputBehaviour, InputMode, PermissionRule, Role};
pub use context::{Identity, RequestContext};
pub use schema::{Field, FieldType, Model, RelationshipKind, Schema};
pub use value::{Value, ValueError};

/// A decoded database row or request payload: column/input name to value.
pub type Record = std::collections::BTreeMap<String, Value>;
