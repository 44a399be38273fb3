//! Storage configuration types and utilities

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::error::{StorageError, StorageResult};

/// Storage backend type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// JSON documents on disk (default)
    #[default]
    File,
    /// Memory storage (for testing)
    Memory,
}

/// Main storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: BackendType,

    /// Base directory for the file backend (default: ~/.kvantor)
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Retry policy for optimistic transactions
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            base_dir: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl StorageConfig {
    /// In-memory configuration, used by tests and benchmarks
    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            ..Default::default()
        }
    }

    /// File configuration rooted at `base_dir`
    pub fn file(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendType::File,
            base_dir: Some(base_dir.into()),
            ..Default::default()
        }
    }

    /// Resolve the file backend directory
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(default_storage_dir)
    }
}

/// Retry policy for conflicting optimistic transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first try
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry delay
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub initial_delay: Duration,

    /// Maximum retry delay
    #[serde(with = "humantime_serde", default = "default_max_retry_delay")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Enable jitter
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_retry_delay(),
            max_delay: default_max_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        let secs = if self.jitter && capped > 0.0 {
            // Full jitter in [capped / 2, capped]
            rand::rng().random_range(capped / 2.0..=capped)
        } else {
            capped
        };

        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Reject policies whose backoff would shrink or overflow
    pub fn validate(&self) -> StorageResult<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(StorageError::configuration(format!(
                "retry_policy.backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(StorageError::configuration(format!(
                "retry_policy.initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    16
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(5)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Get the default storage directory (~/.kvantor)
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".kvantor"))
        .unwrap_or_else(|| PathBuf::from(".kvantor"))
}
