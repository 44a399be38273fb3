//! Configuration for the learner-economy core
//!
//! Loaded from TOML (`~/.kvantor/config.toml` unless a path is given), then
//! overridden by `KVANTOR_*` environment variables. Every field has a default,
//! so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::achievements::{AchievementId, JS_SAMURAI, PY_MASTER};
use crate::course::CourseId;
use crate::error::{Error, Result};
use crate::storage::{BackendType, StorageConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub achievements: AchievementConfig,
}

/// Resource limits, prices and rewards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "default_max_lives")]
    pub max_lives: u32,

    /// Time for one life to come back
    #[serde(with = "humantime_serde", default = "default_restore_interval")]
    pub restore_interval: Duration,

    /// Resolution of the regeneration loop
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,

    #[serde(default = "default_start_lives")]
    pub start_lives: u32,
    #[serde(default = "default_start_hints")]
    pub start_hints: u32,
    #[serde(default)]
    pub start_coins: u32,

    /// Coins awarded for a correct test answer
    #[serde(default = "default_correct_answer_reward")]
    pub correct_answer_reward: u32,

    #[serde(default = "default_life_price")]
    pub life_price: u32,
    #[serde(default = "default_hint_price")]
    pub hint_price: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            max_lives: default_max_lives(),
            restore_interval: default_restore_interval(),
            tick_interval: default_tick_interval(),
            start_lives: default_start_lives(),
            start_hints: default_start_hints(),
            start_coins: 0,
            correct_answer_reward: default_correct_answer_reward(),
            life_price: default_life_price(),
            hint_price: default_hint_price(),
        }
    }
}

/// External code-review / chat assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_review_url")]
    pub base_url: String,

    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            base_url: default_review_url(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
        }
    }
}

/// Which achievement completing a course unlocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementConfig {
    #[serde(default = "default_course_achievements")]
    pub courses: BTreeMap<CourseId, AchievementId>,
}

impl Default for AchievementConfig {
    fn default() -> Self {
        Self {
            courses: default_course_achievements(),
        }
    }
}

// Default value functions for serde
fn default_max_lives() -> u32 {
    10
}

fn default_restore_interval() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_start_lives() -> u32 {
    5
}

fn default_start_hints() -> u32 {
    3
}

fn default_correct_answer_reward() -> u32 {
    10
}

fn default_life_price() -> u32 {
    30
}

fn default_hint_price() -> u32 {
    20
}

fn default_review_url() -> String {
    "http://10.0.2.2:5000/".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_course_achievements() -> BTreeMap<CourseId, AchievementId> {
    BTreeMap::from([
        (CourseId::from("python"), AchievementId::new(PY_MASTER)),
        (CourseId::from("javascript"), AchievementId::new(JS_SAMURAI)),
    ])
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    crate::storage::config::default_storage_dir().join("config.toml")
}

impl CoreConfig {
    /// Load configuration from `path`, or from the default location when it
    /// exists, and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("no configuration file, using defaults");
                    Self::default()
                }
            }
        };

        config.merge_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: CoreConfig = toml::from_str(&content)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Apply `KVANTOR_*` overrides read through `lookup`
    pub fn merge_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("KVANTOR_STORAGE_TYPE") {
            self.storage.backend = match kind.to_lowercase().as_str() {
                "file" => BackendType::File,
                "memory" => BackendType::Memory,
                other => {
                    return Err(Error::Config(format!(
                        "unknown KVANTOR_STORAGE_TYPE '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(dir) = lookup("KVANTOR_STORAGE_DIR") {
            self.storage.base_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("KVANTOR_REVIEW_URL") {
            self.review.base_url = url;
        }
        if let Some(secs) = lookup("KVANTOR_RESTORE_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::Config(format!("KVANTOR_RESTORE_INTERVAL_SECS is not a number: {}", secs))
            })?;
            self.economy.restore_interval = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let economy = &self.economy;
        if economy.max_lives == 0 {
            return Err(Error::Config("economy.max_lives must be positive".to_string()));
        }
        if economy.start_lives > economy.max_lives {
            return Err(Error::Config(format!(
                "economy.start_lives ({}) exceeds max_lives ({})",
                economy.start_lives, economy.max_lives
            )));
        }
        if economy.restore_interval.is_zero() || economy.tick_interval.is_zero() {
            return Err(Error::Config(
                "economy.restore_interval and tick_interval must be non-zero".to_string(),
            ));
        }
        self.storage
            .retry_policy
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(())
    }
}
