//! Configuration loader.
//!
//! Mirrors the usual layering: defaults first, an optional file on top, and
//! environment variables last so operators can override single values.

use super::error::{ConfigResult, ConfigurationError};
use super::DeployerConfig;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DEPLOYER";

pub struct ConfigManager {
    config: DeployerConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration from defaults and the environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::build(None, true)
    }

    /// Load configuration with `path` layered over the defaults.
    ///
    /// The file format follows its extension (TOML, YAML or JSON).
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::build(Some(path), true)
    }

    /// Load `path` without consulting environment variables
    pub fn load_from_file_isolated(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::build(Some(path), false)
    }

    fn build(path: Option<&Path>, with_env: bool) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DeployerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: DeployerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %environment,
            file = ?path.map(|p| p.display().to_string()),
            "Configuration layers merged"
        );
        info!(
            environment = %environment,
            start_timeout_seconds = config.deployer.start_timeout_seconds,
            event_capacity = config.events.capacity,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
        }))
    }

    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Current environment: `DEPLOYER_ENV`, then `APP_ENV`, then `development`
    pub fn detect_environment() -> String {
        env::var("DEPLOYER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[deployer]\nstart_timeout_seconds = 12\n\n[logging]\njson = true"
        )
        .unwrap();

        let manager = ConfigManager::load_from_file_isolated(file.path()).unwrap();
        assert_eq!(manager.config().deployer.start_timeout_seconds, 12);
        assert!(manager.config().logging.json);
        assert!(manager.config().deployer.synchronous_by_default);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[events]\ncapacity = 0").unwrap();

        let err = ConfigManager::load_from_file_isolated(file.path())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ConfigManager::load_from_file("/nonexistent/deployer.toml")
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }
}
