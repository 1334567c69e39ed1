//! Error types for the behavior engine.

use std::fmt;

use companion_core::error::CompanionError;
use serde::{Deserialize, Serialize};

/// One field a strategy definition got wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A strategy definition was rejected. Lists every violated field, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid strategy '{strategy_id}': {}", join_violations(.violations))]
pub struct ValidationError {
    pub strategy_id: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from a behavior's effect.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Behavior effect failed: {0}")]
    HandlerFailed(String),
    #[error("Plugin '{plugin_id}' failed: {message}")]
    Plugin { plugin_id: String, message: String },
    #[error("Payload validation failed: {0}")]
    InvalidPayload(String),
    #[error("Behavior cancelled")]
    Cancelled,
}

/// Errors from catalog import and hot reload.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Catalog source unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catalog rejected: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(" | "))]
    Invalid(Vec<ValidationError>),
    #[error("Catalog lock poisoned")]
    Poisoned,
}

impl From<ValidationError> for CompanionError {
    fn from(err: ValidationError) -> Self {
        CompanionError::Validation(err.to_string())
    }
}

impl From<ActionError> for CompanionError {
    fn from(err: ActionError) -> Self {
        CompanionError::Plugin(err.to_string())
    }
}

impl From<ImportError> for CompanionError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Io(e) => CompanionError::Io(e),
            other => CompanionError::Import(other.to_string()),
        }
    }
}
