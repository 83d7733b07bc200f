use super::{InstallEnvironment, PipelineStage};
use crate::artifact::InstallArtifact;
use crate::constants::properties;
use crate::error::{DeploymentError, Result};
use crate::graph::{InstallGraph, NodeId, VisitOutcome};

/// Stamps scope, origin and atomic-plan membership onto the artifacts this
/// install created.
///
/// Scope names themselves are fixed when nodes are constructed, since sharing
/// decisions depend on them; this stage only records them as deployment
/// properties. Nodes borrowed from earlier installs keep their properties.
pub struct ScopeStage;

impl PipelineStage for ScopeStage {
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<()> {
        let origin = graph
            .artifact(root)
            .ok_or_else(|| DeploymentError::general(format!("Unknown install root {root}")))?
            .identity()
            .to_string();

        for id in graph.subgraph(root) {
            if !env.is_owned(id) {
                continue;
            }
            let Some(artifact) = graph.artifact(id) else {
                continue;
            };
            if artifact.property(properties::ORIGIN).is_none() {
                artifact.set_property(properties::ORIGIN, origin.as_str());
            }
            if let Some(scope) = artifact.scope_name() {
                artifact.set_property(properties::SCOPE, scope);
            }

            if artifact.artifact_type().is_composite() && artifact.descriptor().atomic {
                let plan = artifact.identity().to_string();
                graph.visit(id, |member, node| {
                    if member != id && env.is_owned(member) {
                        node.artifact()
                            .set_property(properties::ATOMIC_PLAN, plan.as_str());
                    }
                    VisitOutcome::Continue
                });
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "scope"
    }
}

/// Stamp a dependency provisioned after this stage ran with the properties its
/// requiring artifact received
pub(crate) fn inherit_scope_properties(
    requiring: &InstallArtifact,
    provisioned: &InstallArtifact,
) {
    for key in [properties::ORIGIN, properties::ATOMIC_PLAN] {
        if let Some(value) = requiring.property(key) {
            provisioned.set_property(key, value);
        }
    }
    if let Some(scope) = provisioned.scope_name() {
        provisioned.set_property(properties::SCOPE, scope);
    }
}
