//! Startup seed data
//!
//! Loads canonical records and user accounts from a JSON file:
//!
//! ```json
//! { "tasks": [...], "hideout_upgrades": [...], "items": [...], "users": [...] }
//! ```
//!
//! Every record is validated against the live schema before it is stored.
//! Records and users that already exist are skipped, so seeding an existing
//! database is harmless.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::auth::Role;
use crate::corrections::validate_record;
use crate::db::Document;
use crate::entities::EntityRepository;
use crate::schema::{EntityKind, SchemaRegistry};
use crate::types::{CodexError, Result};
use crate::users::{AdminUserService, Rank, UserDoc};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub tasks: Vec<Document>,
    pub hideout_upgrades: Vec<Document>,
    pub items: Vec<Document>,
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    /// Fixed id, so tokens minted for seeded users stay valid across restarts
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub rank: Rank,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl SeedUser {
    fn into_user(self) -> Result<UserDoc> {
        let mut user = UserDoc::new(&self.username, &self.email);
        if let Some(id) = self.id {
            uuid::Uuid::parse_str(&id)
                .map_err(|_| CodexError::invalid("id", format!("'{id}' is not a valid user id")))?;
            user.id = id;
        }
        if !self.roles.is_empty() {
            user = user.with_roles(self.roles);
        }
        user.display_name = self.display_name;
        user.bio = self.bio;
        user.rank = self.rank;
        Ok(user)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub records: usize,
    pub users: usize,
    pub skipped: usize,
}

/// Read and apply a seed file
pub async fn load_seed_file(
    path: &Path,
    registry: &SchemaRegistry,
    entities: &EntityRepository,
    users: &AdminUserService,
) -> Result<SeedReport> {
    let raw = tokio::fs::read(path).await?;
    let seed: SeedFile = serde_json::from_slice(&raw)
        .map_err(|e| CodexError::Config(format!("Invalid seed file {}: {e}", path.display())))?;

    let report = apply_seed(seed, registry, entities, users).await?;
    info!(
        path = %path.display(),
        records = report.records,
        users = report.users,
        skipped = report.skipped,
        "Seed data loaded"
    );
    Ok(report)
}

pub async fn apply_seed(
    seed: SeedFile,
    registry: &SchemaRegistry,
    entities: &EntityRepository,
    users: &AdminUserService,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let groups = [
        (EntityKind::Task, seed.tasks),
        (EntityKind::HideoutUpgrade, seed.hideout_upgrades),
        (EntityKind::Item, seed.items),
    ];

    for (kind, records) in groups {
        let schema = registry.get(kind)?;
        for (index, record) in records.into_iter().enumerate() {
            validate_record(&schema, &record)
                .map_err(|e| CodexError::Config(format!("Seed {kind} #{index} is invalid: {e}")))?;

            let id = match record.get("id").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => return Err(CodexError::Config(format!("Seed {kind} #{index} has no id"))),
            };
            if entities.get(kind, &id).await?.is_some() {
                debug!(entity = %kind, id, "Seed record already present");
                report.skipped += 1;
                continue;
            }

            entities.insert_record(kind, record).await?;
            report.records += 1;
        }
    }

    for seed_user in seed.users {
        let username = seed_user.username.clone();
        match users.create_user(seed_user.into_user()?).await {
            Ok(_) => report.users += 1,
            Err(CodexError::Conflict(_)) => {
                debug!(username, "Seed user already present");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
