//! Entity schema layer
//!
//! Explicit descriptions of every correctable entity: field name, semantic
//! type and constraints. The diff engine and the validator both consume
//! these descriptions instead of guessing shapes from the data.
//!
//! ## Entities
//!
//! - [`task::Task`] - quests handed out by traders
//! - [`hideout::HideoutUpgrade`] - hideout station levels
//! - [`item::Item`] - in-game items

pub mod hideout;
pub mod item;
pub mod registry;
pub mod task;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::Document;
use crate::types::{CodexError, Result};

pub use hideout::HideoutUpgrade;
pub use item::Item;
pub use registry::SchemaRegistry;
pub use task::Task;

/// Kinds of correctable entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    HideoutUpgrade,
    Item,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Task, EntityKind::HideoutUpgrade, EntityKind::Item];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::HideoutUpgrade => "hideout_upgrade",
            EntityKind::Item => "item",
        }
    }

    /// Collection holding canonical records of this kind
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::HideoutUpgrade => "hideout_upgrades",
            EntityKind::Item => "items",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CodexError;

    /// Accepts the singular name, the collection name, or kebab-case
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized || k.collection() == normalized)
            .ok_or_else(|| CodexError::invalid("entityType", format!("unknown entity type '{s}'")))
    }
}

/// Semantic type and constraints of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text { max_len: usize },
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    Boolean,
    Enum { options: Vec<String> },
    /// Bounded list of scalar values
    List { item: Box<FieldType>, max_items: usize },
    /// Bounded list of nested records
    Records { fields: Vec<FieldSpec>, max_items: usize },
}

impl FieldType {
    pub fn text(max_len: usize) -> Self {
        FieldType::Text { max_len }
    }

    pub fn enumeration(options: &[&str]) -> Self {
        FieldType::Enum {
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    /// Short name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "text",
            FieldType::Integer { .. } => "integer",
            FieldType::Number { .. } => "number",
            FieldType::Boolean => "boolean",
            FieldType::Enum { .. } => "option",
            FieldType::List { .. } => "list",
            FieldType::Records { .. } => "list of entries",
        }
    }
}

/// A named field of an entity or of a nested record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
        }
    }

    pub fn text(name: &str, max_len: usize) -> Self {
        Self::new(name, FieldType::text(max_len))
    }

    pub fn integer(name: &str, min: i64, max: i64) -> Self {
        Self::new(name, FieldType::Integer { min, max })
    }

    pub fn number(name: &str, min: f64, max: f64) -> Self {
        Self::new(name, FieldType::Number { min, max })
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn enumeration(name: &str, options: &[&str]) -> Self {
        Self::new(name, FieldType::enumeration(options))
    }

    pub fn list(name: &str, item: FieldType, max_items: usize) -> Self {
        Self::new(
            name,
            FieldType::List {
                item: Box::new(item),
                max_items,
            },
        )
    }

    pub fn records(name: &str, max_items: usize, fields: Vec<FieldSpec>) -> Self {
        Self::new(name, FieldType::Records { fields, max_items })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Full description of an entity kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub fields: Vec<FieldSpec>,
}

impl EntitySchema {
    pub fn new(kind: EntityKind, fields: Vec<FieldSpec>) -> Self {
        Self { kind, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSpec> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// A typed canonical record that can be corrected
pub trait CorrectableEntity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    /// Stable identifier, never changed by corrections
    fn id(&self) -> &str;

    /// Schema with the built-in enum options
    fn schema() -> EntitySchema;

    /// Serialize into a document-store record
    fn to_record(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CodexError::Internal(format!(
                "{} did not serialize to an object",
                Self::KIND
            ))),
        }
    }

    /// Deserialize from a document-store record
    fn from_record(record: Document) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(record))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("task".parse::<EntityKind>().unwrap(), EntityKind::Task);
        assert_eq!("tasks".parse::<EntityKind>().unwrap(), EntityKind::Task);
        assert_eq!(
            "hideout-upgrade".parse::<EntityKind>().unwrap(),
            EntityKind::HideoutUpgrade
        );
        assert!("weapon".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_schema_field_lookup() {
        let schema = Task::schema();
        assert!(schema.field("trader").is_some());
        assert!(schema.field("id").is_none());
        assert!(schema.field_names().any(|n| n == "rewards"));
    }

    #[test]
    fn test_field_spec_serializes_flat() {
        let spec = FieldSpec::integer("level", 1, 6).required();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["name"], "level");
        assert_eq!(json["type"], "integer");
        assert_eq!(json["max"], 6);
        assert_eq!(json["required"], true);
    }
}
