//! Registry of deployed top-level artifacts.
//!
//! Keyed three ways: by deployment identity, by source location and by
//! generated file name. No two entries may share any of the three.

use super::options::DeploymentOptions;
use crate::artifact::{DeploymentIdentity, Location};
use crate::error::{DeploymentError, Result};
use crate::graph::NodeId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub identity: DeploymentIdentity,
    pub location: Location,
    pub node: NodeId,
    pub options: DeploymentOptions,
}

#[derive(Debug, Default)]
pub struct RuntimeArtifactRegistry {
    by_identity: HashMap<DeploymentIdentity, RegistryEntry>,
    by_location: HashMap<Location, DeploymentIdentity>,
    by_file_name: HashMap<String, DeploymentIdentity>,
}

impl RuntimeArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `identity` may be registered from `location`.
    ///
    /// Returns the existing identity when exactly this deployment is already
    /// registered, which callers treat as a no-op.
    pub fn check(
        &self,
        identity: &DeploymentIdentity,
        location: &Location,
    ) -> Result<Option<DeploymentIdentity>> {
        if let Some(existing) = self.by_location.get(location) {
            return if existing == identity {
                Ok(Some(existing.clone()))
            } else {
                Err(DeploymentError::DuplicateLocation {
                    location: location.to_string(),
                    existing_identity: existing.to_string(),
                })
            };
        }

        if let Some(entry) = self.by_identity.get(identity) {
            return Err(DeploymentError::DuplicateIdentity {
                identity: identity.to_string(),
                existing_location: entry.location.to_string(),
            });
        }

        if let Some(existing) = self.by_file_name.get(location.file_name()) {
            return Err(DeploymentError::DuplicateFileName {
                file_name: location.file_name().to_string(),
                existing_identity: existing.to_string(),
            });
        }

        Ok(None)
    }

    pub fn register(&mut self, entry: RegistryEntry) -> Result<()> {
        if self.check(&entry.identity, &entry.location)?.is_some() {
            return Ok(());
        }
        self.by_location
            .insert(entry.location.clone(), entry.identity.clone());
        self.by_file_name
            .insert(entry.location.file_name().to_string(), entry.identity.clone());
        self.by_identity.insert(entry.identity.clone(), entry);
        Ok(())
    }

    pub fn unregister(&mut self, identity: &DeploymentIdentity) -> Option<RegistryEntry> {
        let entry = self.by_identity.remove(identity)?;
        self.by_location.remove(&entry.location);
        self.by_file_name.remove(entry.location.file_name());
        Some(entry)
    }

    pub fn get(&self, identity: &DeploymentIdentity) -> Option<&RegistryEntry> {
        self.by_identity.get(identity)
    }

    pub fn find_by_location(&self, location: &Location) -> Option<&RegistryEntry> {
        self.by_location
            .get(location)
            .and_then(|identity| self.by_identity.get(identity))
    }

    pub fn find_by_node(&self, node: NodeId) -> Option<&RegistryEntry> {
        self.by_identity.values().find(|entry| entry.node == node)
    }

    /// Registered identities in sorted order
    pub fn identities(&self) -> Vec<DeploymentIdentity> {
        let mut identities: Vec<_> = self.by_identity.keys().cloned().collect();
        identities.sort();
        identities
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactType;
    use crate::error::ErrorKind;
    use crate::graph::tests::module;
    use crate::graph::InstallGraph;

    fn entry(graph: &mut InstallGraph, name: &str, location: &str) -> RegistryEntry {
        RegistryEntry {
            identity: DeploymentIdentity::new(ArtifactType::Module, name, "1.0.0"),
            location: Location::parse(location).unwrap(),
            node: module(graph, name),
            options: DeploymentOptions::default(),
        }
    }

    #[test]
    fn test_same_deployment_is_a_no_op() {
        let mut graph = InstallGraph::new();
        let mut registry = RuntimeArtifactRegistry::new();
        let x = entry(&mut graph, "x", "/apps/x.json");
        registry.register(x.clone()).unwrap();

        assert_eq!(registry.check(&x.identity, &x.location).unwrap(), Some(x.identity.clone()));
        registry.register(x).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut graph = InstallGraph::new();
        let mut registry = RuntimeArtifactRegistry::new();
        let x = entry(&mut graph, "x", "/apps/x.json");
        registry.register(x.clone()).unwrap();

        let other_at_same_location = entry(&mut graph, "y", "/apps/x.json");
        assert_eq!(
            registry.register(other_at_same_location).unwrap_err().kind(),
            ErrorKind::DuplicateLocation
        );

        let same_identity_elsewhere = entry(&mut graph, "x", "/elsewhere/x2.json");
        assert_eq!(
            registry.register(same_identity_elsewhere).unwrap_err().kind(),
            ErrorKind::DuplicateIdentity
        );

        let same_file_name = entry(&mut graph, "z", "/other/x.json");
        assert_eq!(
            registry.register(same_file_name).unwrap_err().kind(),
            ErrorKind::DuplicateFileName
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_frees_every_key() {
        let mut graph = InstallGraph::new();
        let mut registry = RuntimeArtifactRegistry::new();
        let x = entry(&mut graph, "x", "/apps/x.json");
        registry.register(x.clone()).unwrap();

        assert_eq!(registry.unregister(&x.identity).unwrap().node, x.node);
        assert!(registry.is_empty());
        assert!(registry.find_by_location(&x.location).is_none());
        registry.register(entry(&mut graph, "z", "/other/x.json")).unwrap();
        assert_eq!(registry.identities()[0].name(), "z");
    }
}
