//! Configuration management for the datastore.
//!
//! Sources are merged with priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `DATASTORE_CONFIG_PATH` (or passed to
//!    [`DatastoreConfig::with_override_config`])
//! 3. Environment variables prefixed with `DATASTORE__` (highest priority)
//!
//! ```toml
//! lock_ttl_ms = 20000
//!
//! [retry.sync]
//! max_elapsed_ms = 60000
//! ```

mod retry;
pub use retry::*;

#[cfg(test)]
mod config_test;

//---
use std::env;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LOCK_TTL;
use crate::constants::DEFAULT_WATCH_BUFFER;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DatastoreConfig {
    /// TTL of the distributed write lock (unit: milliseconds)
    ///
    /// A transaction that is never committed keeps the lock until it expires.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    /// Buffer of the change notification stream requested from the store
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,

    /// Retry policies for the resync loop and the post-lock sync check
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: default_lock_ttl_ms(),
            watch_buffer: default_watch_buffer(),
            retry: RetryPolicies::default(),
        }
    }
}

impl DatastoreConfig {
    /// Builds a configuration from defaults, the file named by
    /// `DATASTORE_CONFIG_PATH` if set, and `DATASTORE__*` environment variables.
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call `validate()`.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("DATASTORE_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layers a config file and the current environment on top of `self`.
    ///
    /// # Note
    /// This method does NOT validate the configuration.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        if self.lock_ttl_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lock_ttl_ms must be greater than 0".to_string(),
            )));
        }

        if self.watch_buffer == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch_buffer must be greater than 0".to_string(),
            )));
        }

        self.retry.validate()?;
        Ok(self)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("DATASTORE")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

fn default_lock_ttl_ms() -> u64 {
    DEFAULT_LOCK_TTL.as_millis() as u64
}
fn default_watch_buffer() -> usize {
    DEFAULT_WATCH_BUFFER
}
