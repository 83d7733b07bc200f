#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Deployer Core
//!
//! Deployment engine for a long-running module container: installs artifacts
//! (modules, fragments and plans of them) into a module runtime, starts them,
//! and keeps the set of installed artifacts consistent as deployments come and
//! go.
//!
//! ## Overview
//!
//! Installed artifacts form a DAG, the *install graph*. Each deployed top-level
//! artifact is a root; its plan members and everything provisioned to satisfy
//! its requirements hang below it. Artifacts needed by several deployments are
//! shared rather than duplicated, and an artifact lives exactly as long as some
//! root can reach it.
//!
//! Module activation is asynchronous. Starts are observed through completion
//! [`signal`]s, fanned in across plan members with a lock-free junction, so a
//! caller can deploy synchronously (wait, with a timeout) or fire and forget.
//!
//! ## Module Organization
//!
//! - [`deployer`] - [`ApplicationDeployer`], artifact sources, registry and recovery log
//! - [`graph`] - The install graph and the shared-node locator
//! - [`pipeline`] - Install stages: scoping, import and dependency expansion, validation, commit
//! - [`state_machine`] - Artifact lifecycle over a pluggable module runtime
//! - [`signal`] - Completion signals and the signal junction
//! - [`artifact`] - Identities, versions, descriptors and locations
//! - [`config`] - Layered configuration
//! - [`events`] - Code-keyed deployment event log
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deployer_core::config::DeployerConfig;
//! use deployer_core::deployer::{ApplicationDeployer, DeploymentOptions, InMemoryArtifactSource};
//! use deployer_core::artifact::ArtifactDescriptor;
//! use deployer_core::state_machine::InMemoryModuleRuntime;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(InMemoryArtifactSource::new());
//! let location = source.insert("apps/web.json", ArtifactDescriptor::module("web", "1.0.0"))?;
//!
//! let deployer = ApplicationDeployer::new(
//!     Arc::new(InMemoryModuleRuntime::new()),
//!     source,
//!     &DeployerConfig::default(),
//! );
//! let identity = deployer.deploy(&location, DeploymentOptions::default())?;
//! println!("Deployed {identity}");
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod config;
pub mod constants;
pub mod deployer;
pub mod error;
pub mod events;
pub mod graph;
pub mod logging;
pub mod pipeline;
pub mod signal;
pub mod state_machine;

pub use artifact::{
    ArtifactDescriptor, ArtifactIdentity, ArtifactReference, ArtifactType, DeploymentIdentity,
    InstallArtifact, Location, Version, VersionRange,
};
pub use config::{ConfigManager, DeployerConfig};
pub use deployer::{
    ApplicationDeployer, ArtifactSource, DeploymentOptions, FileSystemArtifactSource,
    InMemoryArtifactSource, RecoveryLog,
};
pub use error::{DeploymentError, ErrorKind, Result};
pub use events::{DeploymentEvent, EventLog};
pub use graph::{InstallGraph, NodeId, SharedNodeLocator};
pub use signal::{AbortableSignal, AbortableSignalJunction, BlockingSignal, Signal};
pub use state_machine::{ArtifactLifecycle, ArtifactState, ModuleRuntime};
