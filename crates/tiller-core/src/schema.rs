//! Schema descriptors for models and fields.
//!
//! These types are the engine's read-only view of the data model:
//! - Models with ordered fields and their actions
//! - Field lookup and column-name mapping
//! - Relationship-kind queries (belongs-to / has-one / has-many)

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::identifiers::to_snake_case;

/// The full application schema handed over by the schema builder.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Schema {
    /// Models in declaration order.
    pub models: Vec<Model>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    /// Add a model to the schema.
    pub fn add_model(&mut self, model: Model) {
        self.models.push(model);
    }

    /// Get a model by name.
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Find the model and action for an action name.
    pub fn action(&self, name: &str) -> Option<(&Model, &Action)> {
        for model in &self.models {
            if let Some(action) = model.actions.iter().find(|a| a.name == name) {
                return Some((model, action));
            }
        }
        None
    }

    /// The relationship kind of a model-typed field, if it is one.
    pub fn relationship_kind(&self, model: &Model, field: &Field) -> Option<RelationshipKind> {
        debug_assert!(model.has_field(&field.name));
        match &field.field_type {
            FieldType::Model(name) => self.model(name)?,
            _ => return None,
        };

        if field.repeated {
            return Some(RelationshipKind::HasMany);
        }
        if field.foreign_key_field_name.is_some() {
            return Some(RelationshipKind::BelongsTo);
        }
        // No key on this side: it lives on the related model.
        Some(RelationshipKind::HasOne)
    }

    /// The column holding the foreign key for a relationship hop.
    ///
    /// For belongs-to the key sits on the owning model; for has-one and
    /// has-many it sits on the related model, named after the backlink
    /// field pointing at `model`.
    pub fn foreign_key_column(&self, model: &Model, field: &Field) -> Option<ForeignKey> {
        match self.relationship_kind(model, field)? {
            RelationshipKind::BelongsTo => {
                let fk = field.foreign_key_field_name.as_deref()?;
                Some(ForeignKey::OnSelf {
                    column: to_snake_case(fk),
                })
            }
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                let related_name = match &field.field_type {
                    FieldType::Model(name) => name.as_str(),
                    _ => return None,
                };
                let related = self.model(related_name)?;
                let backlink = related.fields.iter().find(|f| {
                    matches!(&f.field_type, FieldType::Model(m) if m == &model.name)
                        && f.foreign_key_field_name.is_some()
                })?;
                let fk = backlink.foreign_key_field_name.as_deref()?;
                Some(ForeignKey::OnRelated {
                    column: to_snake_case(fk),
                })
            }
        }
    }
}

/// Which side of a relationship carries the foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKey {
    /// The key is a column on the model owning the relationship field.
    OnSelf { column: String },
    /// The key is a column on the related model.
    OnRelated { column: String },
}

/// A model (entity) in the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model name in UpperCamelCase, e.g. `OrderItem`.
    pub name: String,
    /// Ordered field descriptors.
    pub fields: Vec<Field>,
    /// Actions declared on this model.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Model {
    /// Create a model with no fields or actions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The primary key field name. Every model carries an `id` field.
    pub fn primary_key_field_name(&self) -> &str {
        "id"
    }

    /// The database table backing this model.
    pub fn table_name(&self) -> String {
        to_snake_case(&self.name)
    }

    /// Whether the model declares a field with this name.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// A single field on a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Field name in lowerCamelCase, e.g. `isActive`.
    pub name: String,
    /// The field's type tag.
    pub field_type: FieldType,
    /// Whether the field holds many values (to-many relationship).
    #[serde(default)]
    pub repeated: bool,
    /// Whether the field is nullable.
    #[serde(default)]
    pub optional: bool,
    /// For belongs-to relationships, the sibling field holding the key,
    /// e.g. `productId` for a `product` field.
    #[serde(default)]
    pub foreign_key_field_name: Option<String>,
}

impl Field {
    /// Create a plain (non-relationship) field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            repeated: false,
            optional: false,
            foreign_key_field_name: None,
        }
    }

    /// The database column backing this field.
    pub fn column_name(&self) -> String {
        to_snake_case(&self.name)
    }

    /// Whether this field points at another model.
    pub fn is_model(&self) -> bool {
        matches!(self.field_type, FieldType::Model(_))
    }

    /// Whether this field stores a file reference.
    pub fn is_file(&self) -> bool {
        matches!(self.field_type, FieldType::File)
    }
}

/// Type tags for model fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Primary or foreign key.
    Id,
    /// Text column.
    Text,
    /// 64-bit integer column.
    Int,
    /// Double-precision column.
    Decimal,
    /// Boolean column.
    Boolean,
    /// Timestamp with time zone.
    Timestamp,
    /// Calendar date.
    Date,
    /// Enum column; carries the enum name.
    Enum(String),
    /// Relationship to another model; carries the model name.
    Model(String),
    /// Stored file reference.
    File,
}

impl FieldType {
    /// Whether values of this type order numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Decimal)
    }

    /// Whether values of this type are text.
    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Id | FieldType::Enum(_))
    }
}

/// Relationship kinds between models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// This model holds the foreign key to one related row.
    BelongsTo,
    /// One related row holds the foreign key back to this model.
    HasOne,
    /// Many related rows hold the foreign key back to this model.
    HasMany,
}
