//! # Artifacts
//!
//! Deployable units and their identities. An artifact is either a bundle-like
//! leaf (module or fragment) or a composite plan of other artifacts. Behaviour
//! that differs between the two is selected through the capability accessors on
//! [`ArtifactType`], never by inspecting concrete types.

pub mod descriptor;
pub mod install_artifact;
pub mod location;
pub mod version;

pub use descriptor::{ArtifactDescriptor, ArtifactReference};
pub use install_artifact::InstallArtifact;
pub use location::Location;
pub use version::{Version, VersionRange};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Independently activatable module
    Module,
    /// Module that attaches to a host and is never started on its own
    Fragment,
    /// Composite of other artifacts, optionally creating an isolation scope
    Plan,
}

impl ArtifactType {
    pub fn is_bundle_like(&self) -> bool {
        matches!(self, Self::Module | Self::Fragment)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Plan)
    }

    /// Whether the module runtime can start an artifact of this type directly
    pub fn can_activate(&self) -> bool {
        matches!(self, Self::Module)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Fragment => write!(f, "fragment"),
            Self::Plan => write!(f, "plan"),
        }
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" => Ok(Self::Module),
            "fragment" => Ok(Self::Fragment),
            "plan" => Ok(Self::Plan),
            _ => Err(format!("Invalid artifact type: {s}")),
        }
    }
}

/// Full identity of a node in the install graph.
///
/// Two artifacts with equal identity are the same node for sharing purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    pub artifact_type: ArtifactType,
    pub name: String,
    pub version: Version,
    /// Set only for artifacts inside (or creating) an isolation scope
    pub scope_name: Option<String>,
}

impl ArtifactIdentity {
    pub fn new(artifact_type: ArtifactType, name: impl Into<String>, version: Version) -> Self {
        Self {
            artifact_type,
            name: name.into(),
            version,
            scope_name: None,
        }
    }

    pub fn with_scope(mut self, scope_name: Option<String>) -> Self {
        self.scope_name = scope_name;
        self
    }

    pub fn deployment_identity(&self) -> DeploymentIdentity {
        DeploymentIdentity::new(self.artifact_type, &self.name, &self.version)
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.artifact_type, self.name, self.version)?;
        if let Some(scope) = &self.scope_name {
            write!(f, "@{scope}")?;
        }
        Ok(())
    }
}

/// External handle of a deployed top-level artifact and the registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeploymentIdentity {
    artifact_type: ArtifactType,
    name: String,
    version: String,
}

impl DeploymentIdentity {
    pub fn new(
        artifact_type: ArtifactType,
        name: impl Into<String>,
        version: impl ToString,
    ) -> Self {
        Self {
            artifact_type,
            name: name.into(),
            version: version.to_string(),
        }
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for DeploymentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.artifact_type, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(ArtifactType::Module.is_bundle_like());
        assert!(ArtifactType::Fragment.is_bundle_like());
        assert!(!ArtifactType::Plan.is_bundle_like());
        assert!(ArtifactType::Plan.is_composite());
        assert!(ArtifactType::Module.can_activate());
        assert!(!ArtifactType::Fragment.can_activate());
    }

    #[test]
    fn test_identity_display() {
        let identity = ArtifactIdentity::new(ArtifactType::Module, "x", Version::new(1, 0, 0));
        assert_eq!(identity.to_string(), "module:x:1.0.0");
        assert_eq!(identity.deployment_identity().to_string(), "module:x:1.0.0");

        let scoped = identity.with_scope(Some("app-1.0.0".to_string()));
        assert_eq!(scoped.to_string(), "module:x:1.0.0@app-1.0.0");
    }

    #[test]
    fn test_scope_participates_in_equality() {
        let unscoped = ArtifactIdentity::new(ArtifactType::Module, "x", Version::new(1, 0, 0));
        let scoped = unscoped.clone().with_scope(Some("app".to_string()));
        assert_ne!(unscoped, scoped);
        assert_eq!(unscoped.deployment_identity(), scoped.deployment_identity());
    }
}
