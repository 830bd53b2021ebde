//! Runtime configuration.
//!
//! Every section is optional; missing fields fall back to the same defaults
//! the individual components use when constructed directly.
//!
//! ```yaml
//! cache:
//!   max_size: 200
//! network:
//!   max_retries: 2
//!   retry_delay_ms: 500
//!   report_policy: every_attempt
//! batch:
//!   batch_size: 25
//!   flush_interval_ms: 250
//! presets:
//!   api:
//!     timeout_ms: 8000
//!     retries: 3
//! ```

use crate::batch::{BatchConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
use crate::network::DEFAULT_MAX_RETRIES;
use crate::operation::{OperationOptions, OperationPreset};
use crate::resilience::DEFAULT_RETRY_DELAY;
use crate::telemetry::ReportPolicy;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file read by [`RuntimeConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "ASYNC_OPS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub batch: BatchSettings,
    /// Per-preset overrides on top of the built-in preset values.
    pub presets: HashMap<OperationPreset, PresetConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub report_policy: ReportPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            report_policy: ReportPolicy::default(),
        }
    }
}

impl NetworkConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
        }
    }
}

impl BatchSettings {
    pub fn to_batch_config(&self) -> BatchConfig {
        BatchConfig::new()
            .with_batch_size(self.batch_size)
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
    }
}

/// Partial override of a preset. Unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Zero disables the timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_global_loader: Option<bool>,
}

impl PresetConfig {
    pub fn apply(&self, mut options: OperationOptions) -> OperationOptions {
        if let Some(ms) = self.timeout_ms {
            options.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(retries) = self.retries {
            options.retries = retries;
        }
        if let Some(ms) = self.retry_delay_ms {
            options.retry_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.backoff_multiplier {
            options.backoff_multiplier = multiplier;
        }
        if let Some(show) = self.show_global_loader {
            options.show_global_loader = show;
        }
        options
    }
}

impl RuntimeConfig {
    /// Load a YAML or JSON file, picking the format from the extension, and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("json"))
            == Some(true);
        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `ASYNC_OPS_CONFIG`, or the defaults when it is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size == 0 {
            return Err(invalid("cache.max_size", "must be greater than zero"));
        }
        if self.batch.batch_size == 0 {
            return Err(invalid("batch.batch_size", "must be greater than zero"));
        }
        if self.batch.flush_interval_ms == 0 {
            return Err(invalid("batch.flush_interval_ms", "must be greater than zero"));
        }
        for preset in OperationPreset::ALL {
            let Some(overrides) = self.presets.get(&preset) else {
                continue;
            };
            if let Some(multiplier) = overrides.backoff_multiplier {
                if !multiplier.is_finite() || multiplier < 1.0 {
                    return Err(invalid(
                        &format!("presets.{}.backoff_multiplier", preset.name()),
                        &format!("expected a finite value >= 1.0, got {}", multiplier),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Options for `preset` with any configured overrides applied.
    pub fn preset_options(&self, preset: OperationPreset) -> OperationOptions {
        let base = preset.options();
        match self.presets.get(&preset) {
            Some(overrides) => overrides.apply(base),
            None => base,
        }
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config_validator"),
    )
}
