use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::ingest::IngestSettings;
use crate::store::engine::EngineSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Resolve retweet links into nested records on load.
    #[serde(default = "default_resolve_retweets")]
    pub resolve_retweets: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Streaming feed endpoint.
    #[serde(default)]
    pub endpoint: String,

    /// Optional bearer token for the feed endpoint.
    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.ingest.endpoint.is_empty() {
            url::Url::parse(&self.ingest.endpoint)
                .map_err(|_| ConfigError::InvalidUrl(self.ingest.endpoint.clone()))?;
        }

        if self.ingest.workers == 0 {
            return Err(ConfigError::Config(
                "Ingest workers must be greater than 0".to_string(),
            ));
        }

        if self.ingest.queue_depth == 0 {
            return Err(ConfigError::Config(
                "Ingest queue depth must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            resolve_retweets: self.engine.resolve_retweets,
        }
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            reconnect_delay: Duration::from_millis(self.ingest.reconnect_delay_ms),
            workers: self.ingest.workers,
            queue_depth: self.ingest.queue_depth,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_retweets: default_resolve_retweets(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bearer_token: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn default_resolve_retweets() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
