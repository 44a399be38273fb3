//! External code-review and chat assistant
//!
//! The assistant is a plain request/response HTTP service. Calls are never
//! retried here: a timeout and any other failure are reported as distinct
//! errors and left to the caller.

pub mod chat;
pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chat::{ChatMessage, ChatRole, ChatTranscript};
pub use client::HttpReviewClient;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Review service did not answer in time: {0}")]
    Timeout(String),

    #[error("Review service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Review request failed: {0}")]
    Failed(String),

    #[error("Invalid review service URL: {0}")]
    InvalidUrl(String),
}

impl ReviewError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReviewError::Timeout(_))
    }
}

/// Body of `POST /review`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub task: String,
    pub code: String,
}

/// Body of `POST /ask`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
}

/// Answer of both endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub response: String,
}

#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Ask for feedback on `code` written for `task`
    async fn review(&self, task: &str, code: &str) -> Result<String, ReviewError>;

    /// Free-form question to the assistant
    async fn ask(&self, prompt: &str) -> Result<String, ReviewError>;
}
