//! Proposed correction documents

use bson::{doc, Document as BsonDocument};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::db::IntoIndexes;
use crate::schema::EntityKind;
use crate::types::{CodexError, Result};

/// Sparse field → new value map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, Value>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ChangeSet {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionStatus {
    Pending,
    Approved,
    Rejected,
}

impl CorrectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionStatus::Pending => "pending",
            CorrectionStatus::Approved => "approved",
            CorrectionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CorrectionStatus::Pending)
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrectionStatus {
    type Err = CodexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(CorrectionStatus::Pending),
            "approved" | "approve" => Ok(CorrectionStatus::Approved),
            "rejected" | "reject" => Ok(CorrectionStatus::Rejected),
            other => Err(CodexError::invalid(
                "status",
                format!("'{other}' is not a valid status"),
            )),
        }
    }
}

/// Outcome of merging an approved correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApplyState {
    NotApplied,
    /// Claimed by a reviewer, merge in progress
    Applying { by: String, at: DateTime<Utc> },
    Applied { by: String, at: DateTime<Utc> },
    /// Needs manual reconciliation
    Failed { error: String, at: DateTime<Utc> },
}

impl ApplyState {
    pub fn name(&self) -> &'static str {
        match self {
            ApplyState::NotApplied => "not_applied",
            ApplyState::Applying { .. } => "applying",
            ApplyState::Applied { .. } => "applied",
            ApplyState::Failed { .. } => "failed",
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyState::Applied { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ApplyState::Failed { .. })
    }
}

/// A proposed correction as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionDoc {
    pub id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub changes: ChangeSet,
    pub reason: String,
    /// User id of the submitter
    pub submitted_by: String,
    pub status: CorrectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub apply: ApplyState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CorrectionDoc {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: &str,
        changes: ChangeSet,
        reason: &str,
        submitted_by: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_kind,
            entity_id: entity_id.to_string(),
            changes,
            reason: reason.trim().to_string(),
            submitted_by: submitted_by.to_string(),
            status: CorrectionStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            apply: ApplyState::NotApplied,
            created_at: now,
            updated_at: now,
        }
    }
}

impl IntoIndexes for CorrectionDoc {
    fn into_indices() -> Vec<(BsonDocument, Option<IndexOptions>)> {
        vec![
            // Review queue
            (
                doc! { "status": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("status_created_index".to_string())
                        .build(),
                ),
            ),
            // Corrections of one entity
            (
                doc! { "entity_kind": 1, "entity_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("entity_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "submitted_by": 1 },
                Some(
                    IndexOptions::builder()
                        .name("submitted_by_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse() {
        assert_eq!("approve".parse::<CorrectionStatus>().unwrap(), CorrectionStatus::Approved);
        assert_eq!("Rejected".parse::<CorrectionStatus>().unwrap(), CorrectionStatus::Rejected);
        assert!("maybe".parse::<CorrectionStatus>().is_err());
    }

    #[test]
    fn test_apply_state_serializes_tagged() {
        let state = ApplyState::NotApplied;
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({ "state": "not_applied" }));

        let failed = ApplyState::Failed {
            error: "trader: 'fence' is not a valid option".into(),
            at: Utc::now(),
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(serde_json::from_value::<ApplyState>(value).unwrap(), failed);
    }

    #[test]
    fn test_new_correction_is_pending() {
        let mut changes = ChangeSet::new();
        changes.insert("min_level", json!(12));
        let doc = CorrectionDoc::new(EntityKind::Task, "t-1", changes, "  wrong level  ", "u-1");

        assert_eq!(doc.status, CorrectionStatus::Pending);
        assert_eq!(doc.apply, ApplyState::NotApplied);
        assert_eq!(doc.reason, "wrong level");
        assert!(uuid::Uuid::parse_str(&doc.id).is_ok());
    }
}
