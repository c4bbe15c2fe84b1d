//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid worker count for {queue}: must be at least 1")]
    InvalidWorkerCount { queue: &'static str },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid similarity threshold: {0}. Must be within (0, 1]")]
    InvalidSimilarityThreshold(f64),

    #[error("Invalid timeout pair for {step}: soft ({soft}s) must not exceed hard ({hard}s)")]
    InvalidTimeout { step: &'static str, soft: u64, hard: u64 },
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .triumvir/config.yaml (project config)
    /// 3. .triumvir/local.yaml (local overrides, optional)
    /// 4. Environment variables (TRIUMVIR_ prefix, nested keys split on __)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".triumvir/config.yaml"))
            .merge(Yaml::file(".triumvir/local.yaml"))
            .merge(Env::prefixed("TRIUMVIR_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        for (queue, count) in [
            ("agents", config.workers.agents),
            ("orchestrator", config.workers.orchestrator),
            ("report", config.workers.report),
        ] {
            if count == 0 {
                return Err(ConfigError::InvalidWorkerCount { queue });
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        let threshold = config.cache.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidSimilarityThreshold(threshold));
        }

        for (step, timeout) in [
            ("plan", config.timeouts.plan),
            ("research", config.timeouts.research),
            ("supplement", config.timeouts.supplement),
            ("report", config.timeouts.report),
            ("orchestrate", config.timeouts.orchestrate),
        ] {
            if timeout.soft_secs > timeout.hard_secs {
                return Err(ConfigError::InvalidTimeout {
                    step,
                    soft: timeout.soft_secs,
                    hard: timeout.hard_secs,
                });
            }
        }

        Ok(())
    }
}
