//! Item records

use serde::{Deserialize, Serialize};

use super::{CorrectableEntity, EntityKind, EntitySchema, FieldSpec, FieldType};

pub const CATEGORIES: &[&str] = &[
    "weapon",
    "ammo",
    "armor",
    "medical",
    "provisions",
    "barter",
    "key",
    "container",
    "mod",
    "currency",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    pub category: String,
    #[serde(default)]
    pub base_price: i64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default = "default_cell")]
    pub width: i64,
    #[serde(default = "default_cell")]
    pub height: i64,
    #[serde(default)]
    pub quest_item: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_cell() -> i64 {
    1
}

impl CorrectableEntity for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn id(&self) -> &str {
        &self.id
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(
            EntityKind::Item,
            vec![
                FieldSpec::text("name", 120).required(),
                FieldSpec::text("short_name", 32),
                FieldSpec::enumeration("category", CATEGORIES).required(),
                FieldSpec::integer("base_price", 0, 100_000_000),
                FieldSpec::number("weight", 0.0, 1_000.0),
                FieldSpec::integer("width", 1, 10),
                FieldSpec::integer("height", 1, 10),
                FieldSpec::boolean("quest_item"),
                FieldSpec::list("tags", FieldType::text(40), 16),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_defaults() {
        let item: Item = serde_json::from_value(serde_json::json!({
            "id": "salewa",
            "name": "Salewa first aid kit",
            "category": "medical"
        }))
        .unwrap();

        assert_eq!(item.width, 1);
        assert_eq!(item.height, 1);
        assert!(!item.quest_item);
    }

    #[test]
    fn test_weight_round_trip_keeps_fraction() {
        let item = Item {
            id: "bolts".into(),
            name: "Bolts".into(),
            short_name: None,
            category: "barter".into(),
            base_price: 12_000,
            weight: 0.25,
            width: 1,
            height: 1,
            quest_item: false,
            tags: vec!["hardware".into()],
        };
        let record = item.to_record().unwrap();
        assert_eq!(Item::from_record(record).unwrap(), item);
    }
}
