//! # Artifact State Machine
//!
//! Lifecycle states of install artifacts and the machinery that moves them:
//! the [`ModuleRuntime`] contract, the [`StateMonitor`] that maps runtime events
//! onto artifact state, and [`ArtifactLifecycle`] which applies transitions.

pub mod context;
pub mod events;
pub mod in_memory;
pub mod lifecycle;
pub mod monitor;
pub mod runtime;
pub mod states;

pub use context::ExecutionContext;
pub use events::{ModuleEvent, ModuleId};
pub use in_memory::{Activation, InMemoryModuleRuntime, ModuleStatus};
pub use lifecycle::ArtifactLifecycle;
pub use monitor::StateMonitor;
pub use runtime::{ModuleListener, ModuleRuntime, ModuleRuntimeError, ModuleRuntimeResult};
pub use states::ArtifactState;
