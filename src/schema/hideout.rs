//! Hideout upgrade records

use serde::{Deserialize, Serialize};

use super::task::TRADERS;
use super::{CorrectableEntity, EntityKind, EntitySchema, FieldSpec, FieldType};

pub const STATIONS: &[&str] = &[
    "generator",
    "workbench",
    "medstation",
    "lavatory",
    "nutrition_unit",
    "intelligence_center",
    "shooting_range",
    "security",
    "stash",
];

/// One level of a hideout station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HideoutUpgrade {
    pub id: String,
    pub station: String,
    pub level: i64,
    #[serde(default)]
    pub construction_minutes: i64,
    #[serde(default)]
    pub requirements: Vec<ItemRequirement>,
    #[serde(default)]
    pub station_requirements: Vec<StationRequirement>,
    #[serde(default)]
    pub trader_requirements: Vec<TraderRequirement>,
    #[serde(default)]
    pub bonuses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRequirement {
    pub item: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRequirement {
    pub station: String,
    pub level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderRequirement {
    pub trader: String,
    pub loyalty: i64,
}

impl CorrectableEntity for HideoutUpgrade {
    const KIND: EntityKind = EntityKind::HideoutUpgrade;

    fn id(&self) -> &str {
        &self.id
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(
            EntityKind::HideoutUpgrade,
            vec![
                FieldSpec::enumeration("station", STATIONS).required(),
                FieldSpec::integer("level", 1, 6).required(),
                FieldSpec::integer("construction_minutes", 0, 100_000),
                FieldSpec::records(
                    "requirements",
                    30,
                    vec![
                        FieldSpec::text("item", 120).required(),
                        FieldSpec::integer("quantity", 1, 100_000).required(),
                    ],
                ),
                FieldSpec::records(
                    "station_requirements",
                    10,
                    vec![
                        FieldSpec::enumeration("station", STATIONS).required(),
                        FieldSpec::integer("level", 1, 6).required(),
                    ],
                ),
                FieldSpec::records(
                    "trader_requirements",
                    10,
                    vec![
                        FieldSpec::enumeration("trader", TRADERS).required(),
                        FieldSpec::integer("loyalty", 1, 4).required(),
                    ],
                ),
                FieldSpec::list("bonuses", FieldType::text(200), 10),
            ],
        )
    }
}
