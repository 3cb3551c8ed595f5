//! Action descriptors.
//!
//! An action is one schema-declared operation on a model: get, list,
//! create, update or delete. Its inputs, filter/assignment expression
//! sources and permission rules are fixed at schema build time.

use serde::{Deserialize, Serialize};

/// One declared operation on a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Action name, e.g. `getOrder`.
    pub name: String,
    /// The kind of operation.
    pub action_type: ActionType,
    /// Ordered input descriptors.
    #[serde(default)]
    pub inputs: Vec<Input>,
    /// `@where` expression sources, AND-ed together.
    #[serde(default)]
    pub where_expressions: Vec<String>,
    /// `@set` assignment sources applied on create/update.
    #[serde(default)]
    pub set_expressions: Vec<String>,
    /// Permission rules; an action with none is denied for every input.
    #[serde(default)]
    pub permissions: Vec<PermissionRule>,
}

impl Action {
    /// Inputs read as filters (as opposed to written values).
    pub fn read_inputs(&self) -> impl Iterator<Item = &Input> {
        self.inputs.iter().filter(|i| i.mode == InputMode::Read)
    }

    /// Inputs written into the row on create/update.
    pub fn write_inputs(&self) -> impl Iterator<Item = &Input> {
        self.inputs.iter().filter(|i| i.mode == InputMode::Write)
    }

    /// Expression-based permission rules only.
    pub fn permission_expressions(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().filter_map(|p| match p {
            PermissionRule::Expression(source) => Some(source.as_str()),
            PermissionRule::Roles(_) => None,
        })
    }
}

/// The kind of a declared action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl ActionType {
    /// Whether this action mutates rows.
    pub fn is_mutation(self) -> bool {
        matches!(self, ActionType::Create | ActionType::Update | ActionType::Delete)
    }
}

/// One declared action input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    /// Argument name as it appears in the request payload.
    pub name: String,
    /// Target field path for implicit inputs, e.g. `["customer", "id"]`.
    #[serde(default)]
    pub target: Vec<String>,
    /// Whether the input filters rows or writes a value.
    pub mode: InputMode,
    /// Implicit inputs bind to a field; explicit ones are free arguments
    /// referenced from `@where` / `@set` sources.
    pub behaviour: InputBehaviour,
    /// Whether the argument may be omitted.
    #[serde(default)]
    pub optional: bool,
}

impl Input {
    /// An implicit read input targeting a single field.
    pub fn implicit_read(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            target: vec![name.clone()],
            name,
            mode: InputMode::Read,
            behaviour: InputBehaviour::Implicit,
            optional: false,
        }
    }

    /// An implicit write input targeting a single field.
    pub fn implicit_write(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            target: vec![name.clone()],
            name,
            mode: InputMode::Write,
            behaviour: InputBehaviour::Implicit,
            optional: false,
        }
    }

    /// An explicit input: a named argument with no bound field.
    pub fn explicit(name: impl Into<String>, mode: InputMode) -> Self {
        Self {
            name: name.into(),
            target: Vec::new(),
            mode,
            behaviour: InputBehaviour::Explicit,
            optional: false,
        }
    }
}

/// Whether an input filters rows or supplies a written value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Read,
    Write,
}

/// How an input binds to the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputBehaviour {
    /// Target field inferred from schema position.
    Implicit,
    /// Independently named argument used in expressions.
    Explicit,
}

/// A permission rule attached to an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRule {
    /// Role-based allowlist of emails and domains.
    Roles(Vec<Role>),
    /// Boolean expression over context and model fields.
    Expression(String),
}

/// A named role with its allowlist.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Role {
    /// Role name, e.g. `Admin`.
    pub name: String,
    /// Exact email addresses allowed into the role.
    #[serde(default)]
    pub emails: Vec<String>,
    /// Email domains allowed into the role, e.g. `example.com`.
    #[serde(default)]
    pub domains: Vec<String>,
}
