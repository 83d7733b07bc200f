//! # Deployer Configuration
//!
//! Layered configuration: built-in defaults, then an optional file, then
//! `DEPLOYER_`-prefixed environment variables. Nested keys use a double
//! underscore, e.g. `DEPLOYER_DEPLOYER__START_TIMEOUT_SECONDS=30`.
//!
//! ```rust,no_run
//! use deployer_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().start_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    pub deployer: DeployerSettings,
    pub events: EventSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerSettings {
    /// How long a synchronous deploy waits for activation; zero waits without limit
    pub start_timeout_seconds: u64,
    /// Whether deployments are synchronous unless the caller says otherwise
    pub synchronous_by_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Capacity of the event broadcast channel
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            start_timeout_seconds: system::DEFAULT_START_TIMEOUT_SECONDS,
            synchronous_by_default: true,
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            capacity: system::DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            deployer: DeployerSettings::default(),
            events: EventSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl DeployerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.deployer.start_timeout_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.events.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.capacity",
                self.events.capacity,
                "event channel capacity must be greater than 0",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                "",
                "log level must not be empty",
            ));
        }

        Ok(())
    }
}
