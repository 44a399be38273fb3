//! reqwest-backed review client

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::{AskRequest, ReviewError, ReviewRequest, ReviewResponse, ReviewService};
use crate::config::ReviewConfig;

pub struct HttpReviewClient {
    client: Client,
    base_url: Url,
}

impl HttpReviewClient {
    pub fn new(config: &ReviewConfig) -> Result<Self, ReviewError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ReviewError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| ReviewError::Failed(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<String, ReviewError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ReviewError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))?;
        debug!(%url, "calling review service");

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        match response.status() {
            StatusCode::OK => {
                let answer: ReviewResponse = response.json().await.map_err(classify)?;
                Ok(answer.response)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(%url, %status, "review service error");
                Err(ReviewError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

fn classify(error: reqwest::Error) -> ReviewError {
    if error.is_timeout() {
        ReviewError::Timeout(error.to_string())
    } else {
        ReviewError::Failed(error.to_string())
    }
}

#[async_trait]
impl ReviewService for HttpReviewClient {
    async fn review(&self, task: &str, code: &str) -> Result<String, ReviewError> {
        let request = ReviewRequest {
            task: task.to_string(),
            code: code.to_string(),
        };
        self.post("/review", &request).await
    }

    async fn ask(&self, prompt: &str) -> Result<String, ReviewError> {
        let request = AskRequest {
            prompt: prompt.to_string(),
        };
        self.post("/ask", &request).await
    }
}
