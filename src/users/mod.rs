//! User accounts and the admin update engine

pub mod model;
pub mod sanitize;
pub mod update;

pub use model::{Patch, PublicProfile, Rank, UserDoc, UserUpdate};
pub use sanitize::normalize_username;
pub use update::{AdminUserService, UserPage, UserQuery};
