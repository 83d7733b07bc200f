//! Contract of the underlying module runtime.
//!
//! The runtime installs, starts, stops, updates and uninstalls modules and
//! reports lifecycle transitions through [`ModuleListener`] callbacks, possibly
//! from its own threads. `start` only initiates activation; completion arrives
//! later as a [`ModuleEvent::Started`] or [`ModuleEvent::StartFailed`].

use super::events::{ModuleEvent, ModuleId};
use crate::artifact::{ArtifactDescriptor, Location};
use crate::error::DeploymentError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ModuleRuntimeError {
    #[error("Unknown module {0}")]
    UnknownModule(ModuleId),

    #[error("Install of {name} failed: {reason}")]
    InstallFailed { name: String, reason: String },

    #[error("Update of {module} failed: {reason}")]
    UpdateFailed { module: ModuleId, reason: String },

    #[error("Operation {operation} rejected for {module}: {reason}")]
    Rejected {
        module: ModuleId,
        operation: &'static str,
        reason: String,
    },

    #[error("Listener failed: {0}")]
    ListenerFailed(String),
}

impl From<ModuleRuntimeError> for DeploymentError {
    fn from(err: ModuleRuntimeError) -> Self {
        DeploymentError::Runtime(err.to_string())
    }
}

pub type ModuleRuntimeResult<T> = Result<T, ModuleRuntimeError>;

/// Observer of module lifecycle transitions
pub trait ModuleListener: Send + Sync {
    fn module_changed(&self, module: ModuleId, event: &ModuleEvent) -> ModuleRuntimeResult<()>;
}

pub trait ModuleRuntime: Send + Sync {
    fn install(
        &self,
        descriptor: &ArtifactDescriptor,
        location: &Location,
    ) -> ModuleRuntimeResult<ModuleId>;

    /// Initiate activation; returns before the module is active
    fn start(&self, module: ModuleId) -> ModuleRuntimeResult<()>;

    fn stop(&self, module: ModuleId) -> ModuleRuntimeResult<()>;

    fn uninstall(&self, module: ModuleId) -> ModuleRuntimeResult<()>;

    /// Replace the module's metadata in place
    fn update(&self, module: ModuleId, descriptor: &ArtifactDescriptor) -> ModuleRuntimeResult<()>;

    fn add_listener(&self, listener: Arc<dyn ModuleListener>);
}
