use super::{ArtifactIdentity, ArtifactType, Version, VersionRange};
use crate::error::{DeploymentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata an artifact source yields for a location.
///
/// This is the already-parsed form of a manifest; reading manifest text is the
/// job of the [`crate::deployer::ArtifactSource`] implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Plans only: create an isolation scope for the children
    #[serde(default)]
    pub scoped: bool,
    /// Plans only: children share one lifecycle
    #[serde(default)]
    pub atomic: bool,
    /// Plans only: member artifacts, in start order
    #[serde(default)]
    pub children: Vec<ArtifactReference>,
    /// Modules only: other modules that must be present in the container
    #[serde(default)]
    pub requires: Vec<ArtifactReference>,
    /// Fragments only: name of the host module
    #[serde(default)]
    pub fragment_host: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl ArtifactDescriptor {
    pub fn module(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(ArtifactType::Module, name, version)
    }

    pub fn fragment(
        name: impl Into<String>,
        version: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        let mut descriptor = Self::new(ArtifactType::Fragment, name, version);
        descriptor.fragment_host = Some(host.into());
        descriptor
    }

    pub fn plan(name: impl Into<String>, version: impl Into<String>, scoped: bool) -> Self {
        let mut descriptor = Self::new(ArtifactType::Plan, name, version);
        descriptor.scoped = scoped;
        descriptor
    }

    fn new(
        artifact_type: ArtifactType,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            artifact_type,
            name: name.into(),
            version: version.into(),
            scoped: false,
            atomic: false,
            children: Vec::new(),
            requires: Vec::new(),
            fragment_host: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_child(mut self, reference: ArtifactReference) -> Self {
        self.children.push(reference);
        self
    }

    pub fn with_requirement(mut self, reference: ArtifactReference) -> Self {
        self.requires.push(reference);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Determine the identity this descriptor declares
    pub fn identity(&self, location: &str) -> Result<ArtifactIdentity> {
        let indeterminate = |reason: String| DeploymentError::IdentityIndeterminate {
            location: location.to_string(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(indeterminate("no name declared".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(indeterminate("no version declared".to_string()));
        }
        let version: Version = self.version.parse().map_err(indeterminate)?;

        Ok(ArtifactIdentity::new(
            self.artifact_type,
            self.name.trim(),
            version,
        ))
    }

    /// Name of the isolation scope a scoped plan creates
    pub fn scope_name(&self) -> Option<String> {
        (self.artifact_type.is_composite() && self.scoped)
            .then(|| format!("{}-{}", self.name.trim(), self.version.trim()))
    }
}

/// Reference from one artifact to another by type, name and version range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    #[serde(rename = "type", default = "default_reference_type")]
    pub artifact_type: ArtifactType,
    pub name: String,
    #[serde(default)]
    pub version: VersionRange,
}

fn default_reference_type() -> ArtifactType {
    ArtifactType::Module
}

impl ArtifactReference {
    pub fn new(
        artifact_type: ArtifactType,
        name: impl Into<String>,
        version: VersionRange,
    ) -> Self {
        Self {
            artifact_type,
            name: name.into(),
            version,
        }
    }

    pub fn module(name: impl Into<String>, version: VersionRange) -> Self {
        Self::new(ArtifactType::Module, name, version)
    }

    pub fn matches(&self, identity: &ArtifactIdentity) -> bool {
        self.artifact_type == identity.artifact_type
            && self.name == identity.name
            && self.version.includes(&identity.version)
    }
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.artifact_type, self.name, self.version)
    }
}
