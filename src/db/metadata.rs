//! Common metadata for stored documents
//!
//! Tracks creation and update timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    /// Create new metadata with current timestamp
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy with a fresh `updated_at`
    pub fn touched(&self) -> Self {
        Self {
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
