use thiserror::Error;

use crate::review::ReviewError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Review service error: {0}")]
    Review(#[from] ReviewError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Expected a {expected} page, found {found}")]
    WrongPage {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Course is finished, no current page")]
    CourseFinished,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_retryable(),
            Error::Review(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
