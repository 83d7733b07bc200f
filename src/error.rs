//! # Deployment Errors
//!
//! Every public operation of the deployer reports failure through
//! [`DeploymentError`]. The variants are deliberately coarse so calling tooling
//! can branch on [`DeploymentError::kind`] (retry, report, abort) without
//! string matching.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Underlying cause attached to a wrapped failure.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Error)]
pub enum DeploymentError {
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Duplicate deployment identity {identity} (already deployed from {existing_location})")]
    DuplicateIdentity {
        identity: String,
        existing_location: String,
    },

    #[error("Location {location} is already deployed as {existing_identity}")]
    DuplicateLocation {
        location: String,
        existing_identity: String,
    },

    #[error("File name {file_name} is already in use by {existing_identity}")]
    DuplicateFileName {
        file_name: String,
        existing_identity: String,
    },

    #[error("Unsupported location scheme '{scheme}' in {location}")]
    UnsupportedLocationScheme { scheme: String, location: String },

    #[error("Dependency unsatisfied: {artifact} requires {requirement}")]
    DependencyUnsatisfied {
        artifact: String,
        requirement: String,
    },

    #[error("Unable to determine artifact identity for {location}: {reason}")]
    IdentityIndeterminate { location: String, reason: String },

    #[error("Invalid lifecycle transition for {artifact}: {from} -> {operation}")]
    InvalidTransition {
        artifact: String,
        from: String,
        operation: String,
    },

    #[error("Module runtime error: {0}")]
    Runtime(String),

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{message}")]
    General {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
}

/// Stable classification of a [`DeploymentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArtifactNotFound,
    DuplicateIdentity,
    DuplicateLocation,
    DuplicateFileName,
    UnsupportedLocationScheme,
    DependencyUnsatisfied,
    IdentityIndeterminate,
    InvalidTransition,
    Runtime,
    Io,
    Configuration,
    General,
}

impl DeploymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            Self::DuplicateIdentity { .. } => ErrorKind::DuplicateIdentity,
            Self::DuplicateLocation { .. } => ErrorKind::DuplicateLocation,
            Self::DuplicateFileName { .. } => ErrorKind::DuplicateFileName,
            Self::UnsupportedLocationScheme { .. } => ErrorKind::UnsupportedLocationScheme,
            Self::DependencyUnsatisfied { .. } => ErrorKind::DependencyUnsatisfied,
            Self::IdentityIndeterminate { .. } => ErrorKind::IdentityIndeterminate,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Io { .. } => ErrorKind::Io,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::General { .. } => ErrorKind::General,
        }
    }

    /// Create a general failure without an underlying cause
    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap an unexpected fault, keeping the original as the error source
    pub fn wrap<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::General {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn io(path: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeploymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::wrap("Serialization error", err)
    }
}

pub type Result<T> = std::result::Result<T, DeploymentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        let not_found = DeploymentError::ArtifactNotFound("module:x:1.0.0".to_string());
        let unsatisfied = DeploymentError::DependencyUnsatisfied {
            artifact: "module:a:1.0.0".to_string(),
            requirement: "b [1.0.0, 2.0.0)".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::ArtifactNotFound);
        assert_eq!(unsatisfied.kind(), ErrorKind::DependencyUnsatisfied);
        assert_ne!(not_found.kind(), unsatisfied.kind());
    }

    #[test]
    fn test_wrapped_cause_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = DeploymentError::wrap("Install failed", io);
        assert_eq!(err.to_string(), "Install failed");
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");

        let cloned = err.clone();
        assert!(cloned.source().is_some());
    }

    #[test]
    fn test_error_messages() {
        let err = DeploymentError::UnsupportedLocationScheme {
            scheme: "ftp".to_string(),
            location: "ftp://host/a.json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported location scheme 'ftp' in ftp://host/a.json"
        );
    }
}
