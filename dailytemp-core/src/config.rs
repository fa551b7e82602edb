use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    aggregator::SamplingPlan,
    error::ConfigError,
    model::{Coordinates, SampleRequest},
};

pub const DEFAULT_HOST: &str = "api.openweathermap.org";
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COUNT_MEASUREMENT: usize = 4;

/// Minutes after the requested date at which the first sample is taken.
pub const BASE_OFFSET_MINUTES: u32 = 180;
/// Minutes the samples are spread over.
pub const DAY_SPAN_MINUTES: u32 = 24 * 60;

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// token = "..."
/// count_measurement = 8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenWeather API token, sent as `appid`.
    pub token: String,

    /// Samples per day. Must be at least 1.
    pub count_measurement: usize,

    pub host: String,

    /// Ceiling on concurrent connections; extra samples queue.
    pub max_connections: usize,

    pub request_timeout_secs: u64,

    pub base_offset_minutes: u32,

    pub day_span_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            count_measurement: DEFAULT_COUNT_MEASUREMENT,
            host: DEFAULT_HOST.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            base_offset_minutes: BASE_OFFSET_MINUTES,
            day_span_minutes: DAY_SPAN_MINUTES,
        }
    }
}

impl Config {
    pub fn new(token: impl Into<String>, count_measurement: usize) -> Self {
        Self {
            token: token.into(),
            count_measurement,
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sampling_plan(&self) -> SamplingPlan {
        SamplingPlan::new(self.base_offset_minutes, self.day_span_minutes)
    }

    /// Reject values that would make a request or an aggregation meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.count_measurement == 0 {
            return Err(ConfigError::InvalidSampleCount(self.count_measurement));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let sample = SampleRequest::new(DateTime::<Utc>::UNIX_EPOCH, Coordinates::new(0.0, 0.0));
        sample.url(&self.host, &self.token).map_err(|e| ConfigError::InvalidHost {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "dailytemp", "dailytemp-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
