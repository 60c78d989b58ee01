//! Task (quest) records

use serde::{Deserialize, Serialize};

use super::{CorrectableEntity, EntityKind, EntitySchema, FieldSpec, FieldType};

pub const TRADERS: &[&str] = &[
    "quartermaster",
    "medic",
    "fence",
    "mechanic",
    "tailor",
    "hunter",
    "broker",
    "lighthouse_keeper",
];

pub const MAPS: &[&str] = &[
    "any", "harbor", "forest", "factory", "ridge", "outpost", "tunnels", "lighthouse",
];

pub const OBJECTIVE_KINDS: &[&str] = &[
    "kill", "collect", "handover", "visit", "mark", "survive", "skill", "build",
];

pub const MAX_LEVEL: i64 = 79;

/// A quest handed out by a trader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub trader: String,
    pub map: String,
    pub min_level: i64,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub kappa_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki_url: Option<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<TaskObjective>,
    #[serde(default)]
    pub rewards: Vec<TaskReward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskObjective {
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReward {
    pub item: String,
    pub quantity: i64,
}

impl CorrectableEntity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &str {
        &self.id
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(
            EntityKind::Task,
            vec![
                FieldSpec::text("name", 120).required(),
                FieldSpec::enumeration("trader", TRADERS).required(),
                FieldSpec::enumeration("map", MAPS).required(),
                FieldSpec::integer("min_level", 1, MAX_LEVEL).required(),
                FieldSpec::integer("experience", 0, 1_000_000),
                FieldSpec::boolean("kappa_required"),
                FieldSpec::text("wiki_url", 300),
                FieldSpec::list("prerequisites", FieldType::text(120), 10),
                FieldSpec::records(
                    "objectives",
                    20,
                    vec![
                        FieldSpec::enumeration("kind", OBJECTIVE_KINDS).required(),
                        FieldSpec::text("description", 500).required(),
                        FieldSpec::integer("count", 1, 9_999),
                        FieldSpec::enumeration("map", MAPS),
                    ],
                ),
                FieldSpec::records(
                    "rewards",
                    30,
                    vec![
                        FieldSpec::text("item", 120).required(),
                        FieldSpec::integer("quantity", 1, 1_000_000).required(),
                    ],
                ),
            ],
        )
    }
}
