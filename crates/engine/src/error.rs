//! Engine error types

use arrow::error::ArrowError;
use contracts::ContractError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Engine specific error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session could not be created from its configuration
    #[error("failed to create session: {message}")]
    SessionCreation { message: String },

    /// Operation attempted after `stop()`
    #[error("session '{app_id}' is stopped")]
    SessionStopped { app_id: String },

    /// Input path does not exist
    #[error("input file not found: {path}")]
    InputNotFound { path: String },

    /// Record rejected in fail-fast mode
    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },

    /// Output exists and the save mode forbids replacing it
    #[error("output path already exists: {path}")]
    OutputExists { path: String },

    /// Rows collected to the driver exceed the driver memory
    #[error("result of {bytes} bytes exceeds driver memory limit of {limit} bytes")]
    ResultTooLarge { bytes: u64, limit: u64 },

    /// Scan stopped because its caller gave up
    #[error("scan cancelled")]
    Cancelled,

    /// Background task panicked or was aborted
    #[error("task failed: {message}")]
    Task { message: String },

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl EngineError {
    pub fn session_creation(message: impl Into<String>) -> Self {
        Self::SessionCreation {
            message: message.into(),
        }
    }

    pub fn input_not_found(path: impl Into<String>) -> Self {
        Self::InputNotFound { path: path.into() }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::task(err.to_string())
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, EngineError>;
