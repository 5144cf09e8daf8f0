use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_SYNC_TIMEOUT;
use crate::Error;
use crate::Result;

/// Exponential backoff template
///
/// Each retry waits `interval * random(1 - randomization_factor, 1 + randomization_factor)`
/// and then grows `interval` by `multiplier`, capped at `max_interval_ms`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First retry interval (unit: milliseconds)
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Growth factor applied to the interval after every retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter applied around the current interval, in [0, 1)
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Total time budget (unit: milliseconds, 0 means retry forever)
    #[serde(default)]
    pub max_elapsed_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_ms: 0,
        }
    }
}

impl BackoffPolicy {
    pub fn is_bounded(&self) -> bool {
        self.max_elapsed_ms > 0
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.initial_interval_ms == 0 {
            return Err(invalid(format!("{name}.initial_interval_ms must be greater than 0")));
        }

        if self.max_interval_ms < self.initial_interval_ms {
            return Err(invalid(format!(
                "{name}.max_interval_ms ({}) must be >= initial_interval_ms ({})",
                self.max_interval_ms, self.initial_interval_ms
            )));
        }

        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(invalid(format!(
                "{name}.multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }

        if !(0.0..1.0).contains(&self.randomization_factor) {
            return Err(invalid(format!(
                "{name}.randomization_factor must be in [0, 1), got {}",
                self.randomization_factor
            )));
        }

        Ok(())
    }
}

/// Divide strategies by datastore activity
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryPolicies {
    /// Background cache resync: retried until the datastore shuts down
    #[serde(default)]
    pub resync: BackoffPolicy,

    /// Post-lock cache sync check in `begin`: bounded
    #[serde(default = "default_sync_policy")]
    pub sync: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            resync: BackoffPolicy::default(),
            sync: default_sync_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.resync.validate("retry.resync")?;
        self.sync.validate("retry.sync")?;

        // An unbounded sync check could hang `begin` forever
        if !self.sync.is_bounded() {
            return Err(invalid("retry.sync.max_elapsed_ms must be greater than 0".to_string()));
        }

        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::Config(ConfigError::Message(message))
}

fn default_sync_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_elapsed_ms: DEFAULT_SYNC_TIMEOUT.as_millis() as u64,
        ..BackoffPolicy::default()
    }
}
fn default_initial_interval_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    1.5
}
fn default_randomization_factor() -> f64 {
    0.5
}
fn default_max_interval_ms() -> u64 {
    60_000
}
