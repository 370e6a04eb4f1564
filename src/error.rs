use crate::models::{Category, ValueKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while turning a rule source into a `RuleSet`.
///
/// Every variant aborts the whole load; a partial rule set is never produced.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read rule source {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule document {origin}: {source}")]
    Malformed {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid rule document {origin}: {message}")]
    InvalidDocument { origin: String, message: String },

    #[error("rule {rule_id} ({category}): {message}")]
    InvalidRule {
        category: Category,
        rule_id: String,
        message: String,
    },

    #[error("duplicate rule id {rule_id} in category {category}")]
    DuplicateRule { category: Category, rule_id: String },

    #[error("category {category} is declared by both {first} and {second}")]
    DuplicateCategory {
        category: Category,
        first: String,
        second: String,
    },

    #[error("rule documents disagree on version: {first} vs {second}")]
    VersionMismatch { first: String, second: String },

    #[error("field {field} in {category} is compared as {first} by rule {first_rule} and as {second} by rule {second_rule}")]
    ConflictingFieldType {
        category: Category,
        field: String,
        first: ValueKind,
        first_rule: String,
        second: ValueKind,
        second_rule: String,
    },

    #[error("crop profile {crop}: {message}")]
    InvalidCropProfile { crop: String, message: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] LoadError),

    #[error("Config file error: {0}")]
    Config(String),

    #[error("Unknown crop type: {0}")]
    UnknownCrop(String),

    #[error("Context field {field} must be {expected}, got {found}")]
    ContextType {
        field: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Missing required context field: {0}")]
    MissingField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Audit log error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classes reported to callers of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad rule source or engine configuration; nothing was activated.
    Configuration,
    /// The caller sent input outside the operation's contract.
    InvalidRequest,
    /// Storage or IO trouble outside the evaluation path.
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "ConfigurationError",
            ErrorClass::InvalidRequest => "InvalidRequestError",
            ErrorClass::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Configuration(_) | EngineError::Config(_) => ErrorClass::Configuration,
            EngineError::UnknownCrop(_)
            | EngineError::ContextType { .. }
            | EngineError::MissingField(_)
            | EngineError::InvalidRequest(_) => ErrorClass::InvalidRequest,
            EngineError::Database(_) | EngineError::Io(_) | EngineError::Json(_) => {
                ErrorClass::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_invalid_request() {
        assert_eq!(
            EngineError::UnknownCrop("durian".into()).class(),
            ErrorClass::InvalidRequest
        );
        assert_eq!(
            EngineError::ContextType {
                field: "temperature_c".into(),
                expected: ValueKind::Number,
                found: ValueKind::Text,
            }
            .class(),
            ErrorClass::InvalidRequest
        );
        assert_eq!(
            EngineError::MissingField("planting_date".into()).class(),
            ErrorClass::InvalidRequest
        );
    }

    #[test]
    fn load_errors_are_configuration() {
        let err: EngineError = LoadError::DuplicateRule {
            category: Category::Irrigation,
            rule_id: "RULE_IRR_001".into(),
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.to_string().contains("RULE_IRR_001"));
    }

    #[test]
    fn error_class_display() {
        assert_eq!(ErrorClass::Configuration.as_str(), "ConfigurationError");
        assert_eq!(ErrorClass::InvalidRequest.to_string(), "InvalidRequestError");
    }
}
