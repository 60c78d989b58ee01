//! Shared error and result types for Codex
//!
//! The four domain failures (validation, conflict, authorization, not found)
//! are recoverable and reported back to the caller. Everything else is an
//! infrastructure failure that is logged and surfaced as a generic retry
//! message.

use hyper::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CodexError>;

/// Message shown for every authorization failure, whatever rule tripped
pub const PERMISSION_DENIED_MESSAGE: &str = "You do not have permission to perform this action";

/// Message shown for uncategorised failures
pub const RETRY_MESSAGE: &str = "Something went wrong, please try again";

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Offending field path (`rewards[2].item`), or `None` for record-level issues
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl FieldIssue {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Ordered collection of validation issues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldIssue>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, issue: FieldIssue) {
        self.0.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn issues(&self) -> &[FieldIssue] {
        &self.0
    }

    /// True if any issue names the given field path
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|i| i.field.as_deref() == Some(field))
    }

    /// Convert into `Err` when at least one issue was collected
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodexError::Validation(self))
        }
    }
}

impl From<FieldIssue> for ValidationErrors {
    fn from(issue: FieldIssue) -> Self {
        Self(vec![issue])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors produced by Codex
#[derive(Error, Debug)]
pub enum CodexError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodexError {
    /// Single-issue validation error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        CodexError::Validation(FieldIssue::field(field, message).into())
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CodexError::Validation(_) => StatusCode::BAD_REQUEST,
            CodexError::Conflict(_) => StatusCode::CONFLICT,
            CodexError::Authorization(_) => StatusCode::FORBIDDEN,
            CodexError::NotFound(_) => StatusCode::NOT_FOUND,
            CodexError::Auth(_) => StatusCode::UNAUTHORIZED,
            CodexError::Database(_)
            | CodexError::Config(_)
            | CodexError::Internal(_)
            | CodexError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            CodexError::Validation(_) => "VALIDATION_ERROR",
            CodexError::Conflict(_) => "CONFLICT",
            CodexError::Authorization(_) => "FORBIDDEN",
            CodexError::NotFound(_) => "NOT_FOUND",
            CodexError::Auth(_) => "UNAUTHORIZED",
            CodexError::Database(_)
            | CodexError::Config(_)
            | CodexError::Internal(_)
            | CodexError::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to end users.
    ///
    /// Authorization failures never say which rule tripped, and
    /// infrastructure failures never leak their details.
    pub fn public_message(&self) -> String {
        match self {
            CodexError::Validation(errors) => match errors.issues().first() {
                Some(first) if errors.len() == 1 => first.to_string(),
                _ => "Some fields are invalid".to_string(),
            },
            CodexError::Conflict(msg) | CodexError::NotFound(msg) => msg.clone(),
            CodexError::Authorization(_) => PERMISSION_DENIED_MESSAGE.to_string(),
            CodexError::Auth(_) => "Authentication required".to_string(),
            CodexError::Database(_)
            | CodexError::Config(_)
            | CodexError::Internal(_)
            | CodexError::Io(_) => RETRY_MESSAGE.to_string(),
        }
    }

    /// Field issues, if this is a validation error
    pub fn field_issues(&self) -> Option<&[FieldIssue]> {
        match self {
            CodexError::Validation(errors) => Some(errors.issues()),
            _ => None,
        }
    }

    /// Whether this is one of the caller-recoverable domain errors
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            CodexError::Validation(_)
                | CodexError::Conflict(_)
                | CodexError::Authorization(_)
                | CodexError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for CodexError {
    fn from(e: serde_json::Error) -> Self {
        CodexError::Internal(format!("JSON error: {e}"))
    }
}
