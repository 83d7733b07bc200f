//! # Deployer
//!
//! The public face of the crate: [`ApplicationDeployer`] plus the pieces it is
//! assembled from.
//!
//! - [`source`] reads artifact descriptors and searches the repository
//! - [`registry`] tracks deployed top-level artifacts by identity, location and file name
//! - [`recovery`] records what to redeploy after a restart
//! - [`options`] carries per-deployment caller options

mod builder;
pub mod options;
pub mod orchestrator;
pub mod recovery;
pub mod registry;
pub mod source;

pub use options::DeploymentOptions;
pub use orchestrator::ApplicationDeployer;
pub use recovery::{RecoveryEntry, RecoveryLog};
pub use registry::{RegistryEntry, RuntimeArtifactRegistry};
pub use source::{ArtifactSource, FileSystemArtifactSource, InMemoryArtifactSource};
