//! Configuration module for davsync.
//!
//! Typed configuration structs that map to the YAML configuration file,
//! with loading, validation, and defaults for programmatic use.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for davsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Synchronization engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many members one download bunch may request (multi-get size).
    pub download_batch_size: usize,
    /// Lower bound, in seconds, applied to server-suggested retry delays.
    pub retry_delay_floor_secs: u64,
    /// Upper bound, in seconds, applied to server-suggested retry delays.
    pub retry_delay_ceiling_secs: u64,
    /// How many service-unavailable responses one pass tolerates before
    /// giving up on the collection.
    pub service_unavailable_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_batch_size: 10,
            retry_delay_floor_secs: 15 * 60,
            retry_delay_ceiling_secs: 2 * 60 * 60,
            service_unavailable_limit: 3,
        }
    }
}

impl EngineConfig {
    /// Clamp a server-suggested retry delay into the configured window.
    ///
    /// `None` (no Retry-After header) yields the floor.
    #[must_use]
    pub fn clamp_retry_delay(&self, suggested: Option<Duration>) -> Duration {
        let floor = Duration::from_secs(self.retry_delay_floor_secs);
        let ceiling = Duration::from_secs(self.retry_delay_ceiling_secs);
        match suggested {
            Some(delay) => delay.clamp(floor, ceiling),
            None => floor,
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.download_batch_size == 0 {
            anyhow::bail!("engine.download_batch_size must be at least 1");
        }
        if self.engine.retry_delay_floor_secs > self.engine.retry_delay_ceiling_secs {
            anyhow::bail!(
                "engine.retry_delay_floor_secs ({}) exceeds ceiling ({})",
                self.engine.retry_delay_floor_secs,
                self.engine.retry_delay_ceiling_secs
            );
        }
        Ok(())
    }
}
