//! HTTP server for Codex

pub mod http;

pub use http::{run, AppState};
