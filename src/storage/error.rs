//! Error types for the storage abstraction layer

use std::fmt;
use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conditional write lost against a concurrent modification
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage backend unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transaction gave up after exhausting its retries
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Timeout occurred
    #[error("Timeout: operation took longer than {0:?}")]
    Timeout(std::time::Duration),

    /// Generic error wrapper
    #[error("Storage error: {0}")]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Create a serialization error
    pub fn serialization<E: fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Create a not found error
    pub fn not_found<E: fmt::Display>(item: E) -> Self {
        Self::NotFound(item.to_string())
    }

    /// Create a conflict error
    pub fn conflict<E: fmt::Display>(msg: E) -> Self {
        Self::Conflict(msg.to_string())
    }

    /// Create an unavailable error
    pub fn unavailable<E: fmt::Display>(msg: E) -> Self {
        Self::Unavailable(msg.to_string())
    }

    /// Create a configuration error
    pub fn configuration<E: fmt::Display>(msg: E) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Create a transaction error
    pub fn transaction<E: fmt::Display>(msg: E) -> Self {
        Self::Transaction(msg.to_string())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Unavailable(_) | Self::Timeout(_) | Self::Transaction(_)
        )
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
