//! Configuration for the balance pipeline

use crate::engine::IntegrityPolicy;
use crate::money::MAX_PRECISION;
use serde::{Deserialize, Serialize};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name (used in logs)
    pub service_name: String,

    /// Recomputation pipeline settings
    pub pipeline: PipelineConfig,

    /// How data-integrity problems are handled
    pub integrity: IntegrityPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "balance-core".to_string(),
            pipeline: PipelineConfig::default(),
            integrity: IntegrityPolicy::Strict,
        }
    }
}

/// Recomputation pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Quiet period after the last change before recomputing (milliseconds)
    pub debounce_ms: u64,

    /// Pipeline mailbox capacity (messages)
    pub mailbox_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            mailbox_capacity: 64,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(value) = std::env::var("BALANCES_DEBOUNCE_MS") {
            config.pipeline.debounce_ms = parse_var("BALANCES_DEBOUNCE_MS", &value)?;
        }

        if let Ok(value) = std::env::var("BALANCES_MAILBOX_CAPACITY") {
            config.pipeline.mailbox_capacity = parse_var("BALANCES_MAILBOX_CAPACITY", &value)?;
        }

        let fallback_precision = match std::env::var("BALANCES_FALLBACK_PRECISION") {
            Ok(value) => parse_var("BALANCES_FALLBACK_PRECISION", &value)?,
            Err(_) => 0,
        };

        if let Ok(mode) = std::env::var("BALANCES_INTEGRITY_MODE") {
            config.integrity = match mode.as_str() {
                "strict" => IntegrityPolicy::Strict,
                "best_effort" => IntegrityPolicy::BestEffort { fallback_precision },
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown integrity mode: {}",
                        other
                    )))
                }
            };
        }

        config.validate()
    }

    fn validate(self) -> crate::Result<Self> {
        if let IntegrityPolicy::BestEffort { fallback_precision } = self.integrity {
            if fallback_precision > MAX_PRECISION {
                return Err(crate::Error::Config(format!(
                    "fallback_precision {} exceeds {}",
                    fallback_precision, MAX_PRECISION
                )));
            }
        }
        Ok(self)
    }

    /// Debounce window as a `Duration`
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pipeline.debounce_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}
