use crate::artifact::{ArtifactDescriptor, ArtifactIdentity, Location};
use crate::error::{DeploymentError, Result};
use crate::graph::{InstallGraph, NodeId, SharedNodeLocator};
use crate::pipeline::InstallEnvironment;

/// Constructs the subgraph for a new top-level artifact.
///
/// Plan members are looked up in the plan's scope, first among the nodes this
/// install has already created and then among deployed nodes, and linked when
/// found; anything else is provisioned from the repository as a new owned node.
/// Scoped plans may not nest.
pub(crate) struct GraphBuilder;

impl GraphBuilder {
    pub fn build(
        graph: &mut InstallGraph,
        env: &mut InstallEnvironment<'_>,
        identity: ArtifactIdentity,
        location: Location,
        descriptor: ArtifactDescriptor,
    ) -> Result<NodeId> {
        let composite = descriptor.artifact_type.is_composite();
        let root = env.create_node(graph, identity.clone(), location, descriptor);
        if composite {
            Self::expand_plan(graph, env, root, root, &mut vec![identity])?;
        }
        Ok(root)
    }

    fn expand_plan(
        graph: &mut InstallGraph,
        env: &mut InstallEnvironment<'_>,
        root: NodeId,
        plan: NodeId,
        ancestors: &mut Vec<ArtifactIdentity>,
    ) -> Result<()> {
        let artifact = graph
            .artifact(plan)
            .cloned()
            .ok_or_else(|| DeploymentError::general(format!("Unknown graph node {plan}")))?;
        let scope = artifact.scope_name().map(str::to_string);

        for reference in &artifact.descriptor().children {
            let in_subgraph = graph.subgraph(root).into_iter().find(|id| {
                graph.artifact(*id).is_some_and(|candidate| {
                    candidate.scope_name() == scope.as_deref()
                        && reference.matches(candidate.identity())
                        && !ancestors.contains(candidate.identity())
                })
            });
            let existing = match in_subgraph {
                Some(found) => Some(found),
                None => SharedNodeLocator::find(
                    graph,
                    reference.artifact_type,
                    &reference.name,
                    &reference.version,
                    scope.as_deref(),
                ),
            };
            if let Some(existing) = existing {
                env.link(graph, plan, existing)?;
                continue;
            }

            let (location, descriptor) = env.source.find_in_repository(reference)?.ok_or_else(|| {
                DeploymentError::ArtifactNotFound(format!(
                    "{reference} (member of {})",
                    artifact.identity()
                ))
            })?;
            if scope.is_some() && descriptor.scope_name().is_some() {
                return Err(DeploymentError::general(format!(
                    "Scoped plan {} cannot be nested in scope {}",
                    descriptor.name,
                    scope.as_deref().unwrap_or_default()
                )));
            }

            let identity = descriptor
                .identity(&location.to_string())?
                .with_scope(scope.clone().or_else(|| descriptor.scope_name()));
            if ancestors.contains(&identity) {
                return Err(DeploymentError::general(format!(
                    "Plan {} contains itself through {identity}",
                    artifact.identity()
                )));
            }

            let composite = descriptor.artifact_type.is_composite();
            let child = env.create_node(graph, identity.clone(), location, descriptor);
            env.link(graph, plan, child)?;
            if composite {
                ancestors.push(identity);
                Self::expand_plan(graph, env, root, child, ancestors)?;
                ancestors.pop();
            }
        }
        Ok(())
    }
}
