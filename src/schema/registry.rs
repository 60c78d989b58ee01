//! Live schema registry
//!
//! Holds the current schema of every entity kind. Enum options can be
//! retired or restored at runtime, which is why corrections are
//! re-validated against the registry when they are applied rather than
//! trusting the checks made at submission time.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::{CorrectableEntity, EntityKind, EntitySchema, FieldSpec, FieldType, HideoutUpgrade, Item, Task};
use crate::types::{CodexError, Result};

pub struct SchemaRegistry {
    schemas: DashMap<EntityKind, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            schemas: DashMap::new(),
        }
    }

    /// Registry with the built-in schemas of every entity kind
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Task::schema());
        registry.register(HideoutUpgrade::schema());
        registry.register(Item::schema());
        registry
    }

    pub fn register(&self, schema: EntitySchema) {
        self.schemas.insert(schema.kind, Arc::new(schema));
    }

    /// Current schema snapshot for a kind
    pub fn get(&self, kind: EntityKind) -> Result<Arc<EntitySchema>> {
        self.schemas
            .get(&kind)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| CodexError::NotFound(format!("No schema registered for {kind}")))
    }

    /// Remove an option from an enum field.
    ///
    /// `field_path` is either a top-level field (`trader`) or a sub-field of
    /// a list-of-records field (`objectives.kind`). Returns false when the
    /// option was already absent.
    pub fn retire_option(&self, kind: EntityKind, field_path: &str, option: &str) -> Result<bool> {
        let changed = self.edit_options(kind, field_path, |options| {
            let before = options.len();
            options.retain(|o| o != option);
            options.len() != before
        })?;

        if changed {
            info!(kind = %kind, field = field_path, option, "Retired schema option");
        }
        Ok(changed)
    }

    /// Add an option to an enum field. Returns false when already present.
    pub fn restore_option(&self, kind: EntityKind, field_path: &str, option: &str) -> Result<bool> {
        if option.trim().is_empty() {
            return Err(CodexError::invalid("option", "must not be empty"));
        }

        let changed = self.edit_options(kind, field_path, |options| {
            if options.iter().any(|o| o == option) {
                false
            } else {
                options.push(option.to_string());
                true
            }
        })?;

        if changed {
            info!(kind = %kind, field = field_path, option, "Restored schema option");
        }
        Ok(changed)
    }

    /// Copy-on-write edit of the options of one enum field
    fn edit_options<F>(&self, kind: EntityKind, field_path: &str, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let mut entry = self
            .schemas
            .get_mut(&kind)
            .ok_or_else(|| CodexError::NotFound(format!("No schema registered for {kind}")))?;

        let mut schema = EntitySchema::clone(entry.value());
        let spec = resolve_field_mut(&mut schema, field_path)?;

        let changed = match &mut spec.field_type {
            FieldType::Enum { options } => edit(options),
            other => {
                return Err(CodexError::invalid(
                    field_path,
                    format!("is a {} field, not an option field", other.type_name()),
                ))
            }
        };

        if changed {
            *entry.value_mut() = Arc::new(schema);
        }
        Ok(changed)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn resolve_field_mut<'a>(schema: &'a mut EntitySchema, field_path: &str) -> Result<&'a mut FieldSpec> {
    let kind = schema.kind;
    let unknown = || CodexError::NotFound(format!("Unknown field '{field_path}' on {kind}"));

    let (top, sub) = match field_path.split_once('.') {
        Some((top, sub)) => (top, Some(sub)),
        None => (field_path, None),
    };

    let spec = schema.field_mut(top).ok_or_else(unknown)?;
    match sub {
        None => Ok(spec),
        Some(sub) => match &mut spec.field_type {
            FieldType::Records { fields, .. } => {
                fields.iter_mut().find(|f| f.name == sub).ok_or_else(unknown)
            }
            _ => Err(unknown()),
        },
    }
}
