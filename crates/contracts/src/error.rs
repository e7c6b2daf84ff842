//! Layered error definitions
//!
//! Categorized by source: config / input / size parsing

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Memory / byte size string could not be parsed (e.g. "12x")
    #[error("invalid byte size '{value}': {message}")]
    InvalidByteSize { value: String, message: String },

    // ===== Input Errors =====
    /// Input file does not exist
    #[error("input file not found: {path}")]
    InputNotFound { path: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create byte size error
    pub fn invalid_byte_size(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidByteSize {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create input-not-found error
    pub fn input_not_found(path: impl Into<String>) -> Self {
        Self::InputNotFound { path: path.into() }
    }
}
