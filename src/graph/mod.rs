//! # Install Graph
//!
//! Directed acyclic graph of install artifacts, stored as an arena of nodes with
//! index-based parent and child lists.
//!
//! ## Ownership
//!
//! Children are ordered and owned by composition; parent lists are back
//! references used only for lookup. A node has several parents exactly when it
//! is shared between independently deployed top-level artifacts. The set of
//! top-level artifacts are the graph's *roots*: a node is live while some root
//! reaches it, and only unreachable nodes are ever torn down.
//!
//! ## Traversal
//!
//! [`InstallGraph::visit`] is a depth-first, pre-order walk in child order. A
//! node reachable along several paths is visited once per walk, and the visitor
//! ends the walk early by returning [`VisitOutcome::Stop`].

pub mod locator;

pub use locator::SharedNodeLocator;

use crate::artifact::InstallArtifact;
use crate::error::{DeploymentError, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Index of a node in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Keep walking, descending into this node's children
    Continue,
    /// End the walk now
    Stop,
}

#[derive(Debug)]
pub struct GraphNode {
    artifact: Arc<InstallArtifact>,
    children: Vec<NodeId>,
    parents: Vec<NodeId>,
}

impl GraphNode {
    pub fn artifact(&self) -> &Arc<InstallArtifact> {
        &self.artifact
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }
}

/// Owned snapshot of a subgraph, expanded into a tree.
///
/// Lifecycle operations work on snapshots so they can run without holding the
/// deployer's structural lock.
#[derive(Debug, Clone)]
pub struct ArtifactTree {
    pub artifact: Arc<InstallArtifact>,
    pub children: Vec<ArtifactTree>,
}

#[derive(Debug, Default)]
pub struct InstallGraph {
    nodes: Vec<Option<GraphNode>>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
}

impl InstallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, artifact: Arc<InstallArtifact>) -> NodeId {
        let node = GraphNode {
            artifact,
            children: Vec::new(),
            parents: Vec::new(),
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut GraphNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| DeploymentError::general(format!("Unknown graph node {id}")))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn artifact(&self, id: NodeId) -> Option<&Arc<InstallArtifact>> {
        self.node(id).map(GraphNode::artifact)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(GraphNode::children).unwrap_or(&[])
    }

    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(GraphNode::parents).unwrap_or(&[])
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_some())
            .map(|(index, _)| NodeId(index))
    }

    /// Append `child` to `parent`'s children, refusing edges that would form a cycle
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.contains(parent) || !self.contains(child) {
            return Err(DeploymentError::general(format!(
                "Cannot link {parent} -> {child}: unknown node"
            )));
        }
        if self.children(parent).contains(&child) {
            return Ok(());
        }
        if parent == child || self.reaches(child, parent) {
            return Err(DeploymentError::general(format!(
                "Linking {} -> {} would create a dependency cycle",
                self.describe(parent),
                self.describe(child)
            )));
        }

        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parents.push(parent);
        Ok(())
    }

    /// Remove the edge `parent -> child`, returning whether it existed
    pub fn remove_child_edge(&mut self, parent: NodeId, child: NodeId) -> bool {
        let removed = match self.node_mut(parent) {
            Ok(node) => {
                let before = node.children.len();
                node.children.retain(|c| *c != child);
                node.children.len() != before
            }
            Err(_) => false,
        };
        if removed {
            if let Ok(node) = self.node_mut(child) {
                node.parents.retain(|p| *p != parent);
            }
        }
        removed
    }

    /// Destroy a node that nothing references any more
    pub fn remove_node(&mut self, id: NodeId) -> Result<Arc<InstallArtifact>> {
        if self.is_root(id) || !self.parents(id).is_empty() {
            return Err(DeploymentError::general(format!(
                "Cannot remove {}: still referenced",
                self.describe(id)
            )));
        }
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| DeploymentError::general(format!("Unknown graph node {id}")))?;
        for child in &node.children {
            if let Ok(child) = self.node_mut(*child) {
                child.parents.retain(|p| *p != id);
            }
        }
        self.free.push(id.0);
        Ok(node.artifact)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn add_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn remove_root(&mut self, id: NodeId) -> bool {
        let before = self.roots.len();
        self.roots.retain(|r| *r != id);
        self.roots.len() != before
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.roots.contains(&id)
    }

    /// Whether more than one graph currently contains this node
    pub fn is_shared(&self, id: NodeId) -> bool {
        self.parents(id).len() + usize::from(self.is_root(id)) > 1
    }

    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        self.visit(from, |id, _| {
            if id == to {
                VisitOutcome::Stop
            } else {
                VisitOutcome::Continue
            }
        }) == VisitOutcome::Stop
    }

    /// Depth-first walk from `start`; returns `Stop` if the visitor ended it
    pub fn visit<F>(&self, start: NodeId, mut visitor: F) -> VisitOutcome
    where
        F: FnMut(NodeId, &GraphNode) -> VisitOutcome,
    {
        let mut visited = HashSet::new();
        self.walk(start, &mut visited, &mut |id, node| Ok(visitor(id, node)))
            .unwrap_or(VisitOutcome::Stop)
    }

    /// Depth-first walk whose visitor may fail; the first error ends the walk
    pub fn try_visit<F>(&self, start: NodeId, mut visitor: F) -> Result<VisitOutcome>
    where
        F: FnMut(NodeId, &GraphNode) -> Result<VisitOutcome>,
    {
        let mut visited = HashSet::new();
        self.walk(start, &mut visited, &mut visitor)
    }

    /// Walk from every root in turn, sharing one visited set
    pub fn visit_from_roots<F>(&self, mut visitor: F) -> VisitOutcome
    where
        F: FnMut(NodeId, &GraphNode) -> VisitOutcome,
    {
        let mut visited = HashSet::new();
        for root in &self.roots {
            let outcome = self
                .walk(*root, &mut visited, &mut |id, node| Ok(visitor(id, node)))
                .unwrap_or(VisitOutcome::Stop);
            if outcome == VisitOutcome::Stop {
                return VisitOutcome::Stop;
            }
        }
        VisitOutcome::Continue
    }

    fn walk<F>(
        &self,
        start: NodeId,
        visited: &mut HashSet<NodeId>,
        visitor: &mut F,
    ) -> Result<VisitOutcome>
    where
        F: FnMut(NodeId, &GraphNode) -> Result<VisitOutcome>,
    {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            if visitor(id, node)? == VisitOutcome::Stop {
                return Ok(VisitOutcome::Stop);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(VisitOutcome::Continue)
    }

    /// Every node reachable from `start`, in pre-order
    pub fn subgraph(&self, start: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        self.visit(start, |id, _| {
            nodes.push(id);
            VisitOutcome::Continue
        });
        nodes
    }

    /// Every node reachable from `start`, children before parents
    pub fn post_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.post_order_into(start, &mut visited, &mut order);
        order
    }

    fn post_order_into(&self, id: NodeId, visited: &mut HashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        for child in self.children(id) {
            self.post_order_into(*child, visited, order);
        }
        if self.contains(id) {
            order.push(id);
        }
    }

    pub fn reachable_from_roots(&self) -> HashSet<NodeId> {
        let mut reachable = HashSet::new();
        self.visit_from_roots(|id, _| {
            reachable.insert(id);
            VisitOutcome::Continue
        });
        reachable
    }

    /// Live nodes no root reaches, parents before children
    pub fn collect_unreachable(&self) -> Vec<NodeId> {
        let reachable = self.reachable_from_roots();
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for id in self.node_ids().filter(|id| !reachable.contains(id)) {
            self.post_order_into(id, &mut visited, &mut order);
        }
        order.retain(|id| !reachable.contains(id));
        order.reverse();
        order
    }

    /// Owned tree snapshot of the subgraph under `id`
    pub fn tree(&self, id: NodeId) -> Option<ArtifactTree> {
        let node = self.node(id)?;
        Some(ArtifactTree {
            artifact: Arc::clone(&node.artifact),
            children: node
                .children
                .iter()
                .filter_map(|child| self.tree(*child))
                .collect(),
        })
    }

    fn describe(&self, id: NodeId) -> String {
        self.artifact(id)
            .map(|a| a.identity().to_string())
            .unwrap_or_else(|| id.to_string())
    }
}
