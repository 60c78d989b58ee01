//! Codex - game companion database with community corrections
//!
//! Canonical records (tasks, hideout upgrades, items) are public. Signed-in
//! users propose field-level corrections, moderators review them, and
//! approved corrections are merged back into the canonical records.
//! Admins manage user accounts from a back-office.
//!
//! ## Components
//!
//! - **Schema**: explicit field descriptions per entity kind, live registry
//! - **Corrections**: diff engine, validator, store and apply engine
//! - **Users**: account records and the admin update engine
//! - **Cache**: rendered page cache with targeted invalidation
//! - **Server**: hyper HTTP/1 server and JSON routes

pub mod auth;
pub mod cache;
pub mod config;
pub mod corrections;
pub mod db;
pub mod entities;
pub mod routes;
pub mod schema;
pub mod seed;
pub mod server;
pub mod types;
pub mod users;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CodexError, Result};
