//! Dependency expansion.
//!
//! Every `requires` entry of a newly created bundle-like artifact becomes a child
//! edge. A requirement is satisfied, in order of preference, by a node already in
//! the subgraph being installed, by a node already deployed (shared), or by an
//! artifact provisioned from the repository, which becomes a new owned node,
//! goes through import expansion and has its own requirements expanded in
//! turn. Lookups try the requiring artifact's scope first and then the global
//! scope.

use super::import::expand_imports;
use super::scope::inherit_scope_properties;
use super::{InstallEnvironment, PipelineStage};
use crate::artifact::{ArtifactReference, InstallArtifact};
use crate::constants::properties;
use crate::error::{DeploymentError, Result};
use crate::graph::{InstallGraph, NodeId, SharedNodeLocator};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub struct DependencyExpansionStage;

impl DependencyExpansionStage {
    fn resolve(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        requiring: (NodeId, &Arc<InstallArtifact>),
        requirement: &ArtifactReference,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<(NodeId, bool)> {
        let (requiring_id, artifact) = requiring;
        let mut scopes = vec![artifact.scope_name()];
        if artifact.scope_name().is_some() {
            scopes.push(None);
        }

        for scope in &scopes {
            let in_subgraph = graph.subgraph(root).into_iter().find(|id| {
                *id != requiring_id
                    && graph.artifact(*id).is_some_and(|candidate| {
                        candidate.scope_name() == *scope
                            && requirement.matches(candidate.identity())
                    })
            });
            if let Some(found) = in_subgraph {
                return Ok((found, false));
            }

            let shared = SharedNodeLocator::find(
                graph,
                requirement.artifact_type,
                &requirement.name,
                &requirement.version,
                *scope,
            );
            if let Some(found) = shared {
                return Ok((found, false));
            }
        }

        let unsatisfied = || DeploymentError::DependencyUnsatisfied {
            artifact: artifact.identity().to_string(),
            requirement: requirement.to_string(),
        };
        let (location, descriptor) = env
            .source
            .find_in_repository(requirement)?
            .ok_or_else(unsatisfied)?;
        let identity = descriptor
            .identity(&location.to_string())?
            .with_scope(artifact.scope_name().map(str::to_string));
        if !requirement.matches(&identity) {
            return Err(unsatisfied());
        }

        debug!(
            artifact = %artifact.identity(),
            provisioned = %identity,
            location = %location,
            "Provisioning dependency from repository"
        );
        let node = env.create_node(graph, identity, location, descriptor);
        if let Some(provisioned) = graph.artifact(node) {
            provisioned.set_property(properties::PROVISIONED_FOR, artifact.identity().to_string());
            inherit_scope_properties(artifact, provisioned);
            if provisioned.artifact_type().is_bundle_like() {
                expand_imports(env.import_expander, provisioned)?;
            }
        }
        Ok((node, true))
    }
}

impl PipelineStage for DependencyExpansionStage {
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<()> {
        let mut queue: VecDeque<NodeId> = graph
            .subgraph(root)
            .into_iter()
            .filter(|id| env.is_owned(*id))
            .collect();
        let mut expanded = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !expanded.insert(id) {
                continue;
            }
            let Some(artifact) = graph.artifact(id).cloned() else {
                continue;
            };
            if !artifact.artifact_type().is_bundle_like() {
                continue;
            }

            for requirement in &artifact.descriptor().requires {
                let (target, provisioned) =
                    self.resolve(graph, root, (id, &artifact), requirement, env)?;
                env.link(graph, id, target)?;
                if provisioned {
                    queue.push_back(target);
                }
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "dependency_expansion"
    }
}
