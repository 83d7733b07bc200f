use super::import::ImportExpander;
use crate::artifact::{ArtifactDescriptor, ArtifactIdentity, InstallArtifact, Location};
use crate::deployer::ArtifactSource;
use crate::error::Result;
use crate::events::EventLog;
use crate::graph::{InstallGraph, NodeId};
use crate::state_machine::{ArtifactLifecycle, ArtifactState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Record of what an in-flight install created and what it borrowed.
///
/// Owned nodes were created by this install and are destroyed if it fails.
/// Shared edges point from owned nodes into nodes that already existed; rolling
/// back removes the edges and leaves the shared nodes alone.
#[derive(Debug, Default)]
pub struct OwnershipLedger {
    owned: Vec<NodeId>,
    shared_edges: Vec<(NodeId, NodeId)>,
}

impl OwnershipLedger {
    pub fn record_owned(&mut self, node: NodeId) {
        if !self.owned.contains(&node) {
            self.owned.push(node);
        }
    }

    pub fn is_owned(&self, node: NodeId) -> bool {
        self.owned.contains(&node)
    }

    pub fn owned(&self) -> &[NodeId] {
        &self.owned
    }

    pub fn shared_edges(&self) -> &[(NodeId, NodeId)] {
        &self.shared_edges
    }

    /// Add the edge `parent -> child`, noting it when `child` is not ours
    pub fn link(&mut self, graph: &mut InstallGraph, parent: NodeId, child: NodeId) -> Result<()> {
        let existed = graph.children(parent).contains(&child);
        graph.add_child(parent, child)?;
        if !existed && !self.is_owned(child) {
            self.shared_edges.push((parent, child));
        }
        Ok(())
    }

    /// Undo the install: detach from shared nodes, then uninstall and destroy
    /// every owned node
    pub fn rollback(self, graph: &mut InstallGraph, lifecycle: &ArtifactLifecycle) {
        for (parent, child) in self.shared_edges.iter().rev() {
            graph.remove_child_edge(*parent, *child);
        }
        for node in &self.owned {
            graph.remove_root(*node);
            for child in graph.children(*node).to_vec() {
                graph.remove_child_edge(*node, child);
            }
        }

        for node in self.owned.iter().rev() {
            let artifact = match graph.remove_node(*node) {
                Ok(artifact) => artifact,
                Err(err) => {
                    warn!(node = %node, error = %err, "Rollback could not remove graph node");
                    continue;
                }
            };
            if artifact.state() != ArtifactState::Initial {
                if let Err(err) = lifecycle.uninstall(&artifact) {
                    warn!(
                        artifact = %artifact.identity(),
                        error = %err,
                        "Rollback could not uninstall artifact"
                    );
                }
            }
            debug!(artifact = %artifact.identity(), "Rolled back owned artifact");
        }
    }
}

/// Services and bookkeeping handed to every pipeline stage
pub struct InstallEnvironment<'a> {
    pub event_log: &'a EventLog,
    pub source: &'a dyn ArtifactSource,
    pub lifecycle: &'a ArtifactLifecycle,
    pub import_expander: &'a dyn ImportExpander,
    ledger: OwnershipLedger,
}

impl<'a> InstallEnvironment<'a> {
    pub fn new(
        event_log: &'a EventLog,
        source: &'a dyn ArtifactSource,
        lifecycle: &'a ArtifactLifecycle,
        import_expander: &'a dyn ImportExpander,
    ) -> Self {
        Self {
            event_log,
            source,
            lifecycle,
            import_expander,
            ledger: OwnershipLedger::default(),
        }
    }

    pub fn ledger(&self) -> &OwnershipLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut OwnershipLedger {
        &mut self.ledger
    }

    pub fn into_ledger(self) -> OwnershipLedger {
        self.ledger
    }

    pub fn is_owned(&self, node: NodeId) -> bool {
        self.ledger.is_owned(node)
    }

    /// Create a node owned by this install
    pub fn create_node(
        &mut self,
        graph: &mut InstallGraph,
        identity: ArtifactIdentity,
        location: Location,
        descriptor: ArtifactDescriptor,
    ) -> NodeId {
        let artifact = Arc::new(InstallArtifact::new(identity, location, descriptor));
        let node = graph.add_node(artifact);
        self.ledger.record_owned(node);
        node
    }

    pub fn link(&mut self, graph: &mut InstallGraph, parent: NodeId, child: NodeId) -> Result<()> {
        self.ledger.link(graph, parent, child)
    }
}
