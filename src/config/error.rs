//! Configuration error types.

use crate::error::DeploymentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Layering or deserializing the sources failed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

impl From<ConfigurationError> for DeploymentError {
    fn from(err: ConfigurationError) -> Self {
        DeploymentError::Configuration(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
