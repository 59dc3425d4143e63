//! Scheduler configuration.
//!
//! ```toml
//! min_periodic_interval_secs = 900
//! min_periodic_flex_secs = 300
//! max_backoff_secs = 18000
//! max_data_bytes = 10240
//! expedited_quota = 8
//!
//! [default_backoff]
//! policy = "exponential"
//! base_delay_ms = 30000
//!
//! [store_retry]
//! max_attempts = 5
//! base_delay_ms = 50
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::backoff::{Backoff, BackoffPolicy};
use crate::domain::data::MAX_DATA_BYTES;
use crate::domain::schedule::PeriodicFloors;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub min_periodic_interval_secs: u64,
    pub min_periodic_flex_secs: u64,
    /// Cap on any computed retry delay.
    pub max_backoff_secs: u64,
    /// Backoff for tasks that do not set one.
    pub default_backoff: BackoffConfig,
    pub max_data_bytes: usize,
    /// Concurrently running expedited tasks.
    pub expedited_quota: usize,
    pub store_retry: StoreRetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_periodic_interval_secs: 15 * 60,
            min_periodic_flex_secs: 5 * 60,
            max_backoff_secs: 5 * 60 * 60,
            default_backoff: BackoffConfig::default(),
            max_data_bytes: MAX_DATA_BYTES,
            expedited_quota: 8,
            store_retry: StoreRetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    pub policy: BackoffPolicy,
    pub base_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::Exponential,
            base_delay_ms: 30_000,
        }
    }
}

/// Retry budget for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
        }
    }
}

impl StoreRetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.min_periodic_interval_secs == 0 {
            return invalid("min_periodic_interval_secs must be positive");
        }
        if self.min_periodic_flex_secs == 0 {
            return invalid("min_periodic_flex_secs must be positive");
        }
        if self.min_periodic_flex_secs > self.min_periodic_interval_secs {
            return invalid("min_periodic_flex_secs must not exceed min_periodic_interval_secs");
        }
        if self.max_backoff_secs == 0 {
            return invalid("max_backoff_secs must be positive");
        }
        if self.default_backoff.base_delay_ms == 0 {
            return invalid("default_backoff.base_delay_ms must be positive");
        }
        if self.max_data_bytes == 0 {
            return invalid("max_data_bytes must be positive");
        }
        if self.store_retry.max_attempts == 0 {
            return invalid("store_retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn periodic_floors(&self) -> PeriodicFloors {
        PeriodicFloors {
            min_interval: Duration::from_secs(self.min_periodic_interval_secs),
            min_flex: Duration::from_secs(self.min_periodic_flex_secs),
        }
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn default_backoff(&self) -> Backoff {
        Backoff {
            policy: self.default_backoff.policy,
            base_delay: Duration::from_millis(self.default_backoff.base_delay_ms),
        }
    }
}
