/*!
 * Shim Configuration
 *
 * Compile-time constants of the emulated API turned into runtime settings
 */

use super::types::{Priority, Tick};
use serde::{Deserialize, Serialize};
use miette::Diagnostic;
use thiserror::Error;

/// Environment override for `notification_array_entries`
pub const ENV_NOTIFY_ENTRIES: &str = "RTOS_SHIM_NOTIFY_ENTRIES";
/// Environment override for `max_priorities`
pub const ENV_MAX_PRIORITIES: &str = "RTOS_SHIM_MAX_PRIORITIES";

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    #[diagnostic(code(shim::config::json))]
    Json(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for {key}")]
    #[diagnostic(code(shim::config::env), help("expected a positive integer"))]
    Env { key: &'static str, value: String },

    #[error("{0} must be non-zero")]
    #[diagnostic(code(shim::config::zero))]
    Zero(&'static str),
}

/// Settings of the shim layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Notification slots per task
    pub notification_array_entries: usize,
    /// Exclusive upper bound on task priorities
    pub max_priorities: Priority,
    /// Round-robin slice handed to the host for each task
    pub thread_time_slice: Tick,
    /// Name of the host timer service thread
    pub timer_daemon_name: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            notification_array_entries: 1,
            max_priorities: 25,
            thread_time_slice: 10,
            timer_daemon_name: "Tmr Svc".to_string(),
        }
    }
}

impl ShimConfig {
    /// Configuration with `entries` notification slots per task
    pub fn with_notification_entries(entries: usize) -> Self {
        Self {
            notification_array_entries: entries,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `RTOS_SHIM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = read_env(ENV_NOTIFY_ENTRIES)? {
            config.notification_array_entries = v as usize;
        }
        if let Some(v) = read_env(ENV_MAX_PRIORITIES)? {
            config.max_priorities = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notification_array_entries == 0 {
            return Err(ConfigError::Zero("notification_array_entries"));
        }
        if self.max_priorities == 0 {
            return Err(ConfigError::Zero("max_priorities"));
        }
        Ok(())
    }
}

fn read_env(key: &'static str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value }),
        Err(_) => Ok(None),
    }
}
