use super::{InstallEnvironment, PipelineStage};
use crate::artifact::{ArtifactIdentity, ArtifactType, InstallArtifact, VersionRange};
use crate::error::{DeploymentError, Result};
use crate::graph::{InstallGraph, NodeId, SharedNodeLocator, VisitOutcome};
use std::collections::HashMap;

/// Rejects subgraphs that would be ambiguous or unusable once installed.
///
/// - two distinct nodes with one identity (same type, name, version and scope)
/// - a fragment whose host module is neither in the subgraph nor deployed
pub struct ValidationStage;

impl ValidationStage {
    fn host_present(
        graph: &InstallGraph,
        root: NodeId,
        fragment: &InstallArtifact,
        host: &str,
    ) -> bool {
        let mut scopes = vec![fragment.scope_name()];
        if fragment.scope_name().is_some() {
            scopes.push(None);
        }

        scopes.into_iter().any(|scope| {
            let in_subgraph = graph.visit(root, |_, node| {
                let candidate = node.artifact();
                if candidate.artifact_type() == ArtifactType::Module
                    && candidate.name() == host
                    && candidate.scope_name() == scope
                {
                    VisitOutcome::Stop
                } else {
                    VisitOutcome::Continue
                }
            }) == VisitOutcome::Stop;

            in_subgraph
                || SharedNodeLocator::find(
                    graph,
                    ArtifactType::Module,
                    host,
                    &VersionRange::any(),
                    scope,
                )
                .is_some()
        })
    }
}

impl PipelineStage for ValidationStage {
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        _env: &mut InstallEnvironment<'_>,
    ) -> Result<()> {
        let graph: &InstallGraph = graph;
        let mut seen: HashMap<ArtifactIdentity, NodeId> = HashMap::new();

        graph.try_visit(root, |id, node| {
            let artifact = node.artifact();
            let identity = artifact.identity();
            if let Some(existing) = seen.insert(identity.clone(), id) {
                if existing != id {
                    return Err(DeploymentError::general(format!(
                        "Duplicate artifact {identity} in scope {}",
                        identity.scope_name.as_deref().unwrap_or("<global>")
                    )));
                }
            }

            if artifact.artifact_type() == ArtifactType::Fragment {
                let requirement = match artifact.descriptor().fragment_host {
                    Some(host) if Self::host_present(graph, root, artifact, &host) => None,
                    Some(host) => Some(format!("fragment host {host}")),
                    None => Some("fragment host (none declared)".to_string()),
                };
                if let Some(requirement) = requirement {
                    return Err(DeploymentError::DependencyUnsatisfied {
                        artifact: identity.to_string(),
                        requirement,
                    });
                }
            }
            Ok(VisitOutcome::Continue)
        })?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "validation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactDescriptor, Location};
    use crate::error::ErrorKind;
    use crate::pipeline::tests::Harness;

    #[test]
    fn test_fragment_with_host_in_subgraph_passes() {
        let harness = Harness::new();
        let mut graph = InstallGraph::new();
        let mut env = harness.env();
        let plan = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::plan("p", "1.0.0", false),
        );
        let host = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::module("web", "1.0.0"),
        );
        let fragment = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::fragment("web.i18n", "1.0.0", "web"),
        );
        env.link(&mut graph, plan, host).unwrap();
        env.link(&mut graph, plan, fragment).unwrap();

        ValidationStage.process(&mut graph, plan, &mut env).unwrap();
    }

    #[test]
    fn test_fragment_without_host_is_unsatisfied() {
        let harness = Harness::new();
        let mut graph = InstallGraph::new();
        let mut env = harness.env();
        let fragment = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::fragment("web.i18n", "1.0.0", "web"),
        );

        let err = ValidationStage
            .process(&mut graph, fragment, &mut env)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnsatisfied);
    }

    #[test]
    fn test_fragment_host_may_be_deployed_elsewhere() {
        let harness = Harness::new();
        let mut graph = InstallGraph::new();
        let mut earlier = harness.env();
        let host = harness.owned_root(
            &mut graph,
            &mut earlier,
            ArtifactDescriptor::module("web", "1.0.0"),
        );
        graph.add_root(host);

        let mut env = harness.env();
        let fragment = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::fragment("web.i18n", "1.0.0", "web"),
        );
        ValidationStage.process(&mut graph, fragment, &mut env).unwrap();
    }

    #[test]
    fn test_duplicate_identity_in_scope_rejected() {
        let harness = Harness::new();
        let mut graph = InstallGraph::new();
        let mut env = harness.env();
        let plan = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::plan("p", "1.0.0", false),
        );
        for location in ["mem:a/lib", "mem:b/lib"] {
            let descriptor = ArtifactDescriptor::module("lib", "1.0.0");
            let identity = descriptor.identity(location).unwrap();
            let node = env.create_node(
                &mut graph,
                identity,
                Location::parse(location).unwrap(),
                descriptor,
            );
            env.link(&mut graph, plan, node).unwrap();
        }

        let err = ValidationStage.process(&mut graph, plan, &mut env).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);
        assert!(err.to_string().contains("Duplicate artifact module:lib:1.0.0"));
    }
}
