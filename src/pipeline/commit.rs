use super::{InstallEnvironment, PipelineStage};
use crate::error::{DeploymentError, Result};
use crate::graph::{InstallGraph, NodeId};

/// Installs every artifact of the subgraph into the module runtime, children
/// before parents. Artifacts that are already installed are skipped.
pub struct CommitStage;

impl PipelineStage for CommitStage {
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<()> {
        for id in graph.post_order(root) {
            let artifact = graph
                .artifact(id)
                .ok_or_else(|| DeploymentError::general(format!("Unknown graph node {id}")))?;
            env.lifecycle.install(artifact)?;
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "commit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactDescriptor;
    use crate::pipeline::tests::Harness;
    use crate::state_machine::ArtifactState;

    #[test]
    fn test_installs_whole_subgraph() {
        let harness = Harness::new();
        let mut graph = InstallGraph::new();
        let mut env = harness.env();
        let plan = harness.owned_root(
            &mut graph,
            &mut env,
            ArtifactDescriptor::plan("p", "1.0.0", false),
        );
        let a = harness.owned_root(&mut graph, &mut env, ArtifactDescriptor::module("a", "1.0.0"));
        let b = harness.owned_root(&mut graph, &mut env, ArtifactDescriptor::module("b", "1.0.0"));
        env.link(&mut graph, plan, a).unwrap();
        env.link(&mut graph, a, b).unwrap();

        CommitStage.process(&mut graph, plan, &mut env).unwrap();

        for id in [plan, a, b] {
            assert_eq!(graph.artifact(id).unwrap().state(), ArtifactState::Installed);
        }
        // The plan itself has no module
        assert_eq!(harness.runtime.installed_count(), 2);
    }

    #[test]
    fn test_install_failure_stops_commit() {
        let harness = Harness::new();
        harness.runtime.fail_install("b", "corrupt");
        let mut graph = InstallGraph::new();
        let mut env = harness.env();
        let a = harness.owned_root(&mut graph, &mut env, ArtifactDescriptor::module("a", "1.0.0"));
        let b = harness.owned_root(&mut graph, &mut env, ArtifactDescriptor::module("b", "1.0.0"));
        env.link(&mut graph, a, b).unwrap();

        assert!(CommitStage.process(&mut graph, a, &mut env).is_err());
        assert_eq!(graph.artifact(a).unwrap().state(), ArtifactState::Initial);
    }
}
