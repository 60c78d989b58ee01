//! Authentication and authorization for Codex
//!
//! Provides:
//! - Principals and roles handed to every mutating operation
//! - Operation permission table
//! - JWT bearer token validation at the HTTP edge

pub mod jwt;
pub mod permissions;
pub mod principal;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};
pub use permissions::{ensure_allowed, is_operation_allowed, Operation};
pub use principal::{Principal, Role};
