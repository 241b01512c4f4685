use serde::{Deserialize, Serialize};

use crate::value::Stage;

/// A single rule a `PatientRecord` failed for the requested report type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("knowledge index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("generation service unavailable for {stage}: {reason}")]
    GenerationUnavailable { stage: Stage, reason: String },

    #[error("malformed output from {stage}: missing {missing:?}")]
    MalformedOutput { stage: Stage, missing: Vec<String> },

    #[error("patient record rejected: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid workflow transition: {0}")]
    InvalidTransition(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
