use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    /// Path of the offending field, e.g. `surface` or `[3].rooms`
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

/// Client-correctable input error, always mapped to 422.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, message)],
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|violation| violation.field.as_str())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|violation| format!("{}: {}", violation.field, violation.message))
            .collect();
        write!(f, "invalid input ({})", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Failure to read or accept a model artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("model artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model artifact: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("model not loaded")]
    ModelUnavailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] ArtifactError),

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Stable machine-readable kind used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::ModelUnavailable => "model_unavailable",
            ServiceError::Serialization(_) => "serialization_error",
            ServiceError::Prediction(_) => "prediction_error",
            ServiceError::Config(_) => "config_error",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
