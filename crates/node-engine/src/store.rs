//! Graph store consumed by the execution engine
//!
//! The engine reads nodes and edges through [`GraphStore`] and records
//! status and output transitions with [`GraphStore::update_node`]. The
//! store is injected into the engine, so tests and hosts can each supply
//! their own.

use parking_lot::RwLock;

use crate::types::{Edge, Node, NodePatch, WorkflowGraph};

/// Read/write access to the node graph
///
/// Implementations must not block for long: the engine calls these methods
/// between provider awaits, and the UI reads the same store concurrently.
pub trait GraphStore: Send + Sync {
    /// Look up a node by ID
    fn get_node_by_id(&self, id: &str) -> Option<Node>;

    /// All edges targeting the given node, in insertion order
    fn get_input_edges(&self, node_id: &str) -> Vec<Edge>;

    /// Snapshot of all nodes, in insertion order
    fn nodes(&self) -> Vec<Node>;

    /// Snapshot of all edges, in insertion order
    fn edges(&self) -> Vec<Edge>;

    /// Shallow-merge a patch into a node; returns false if the node is gone
    fn update_node(&self, id: &str, patch: NodePatch) -> bool;

    /// Insert a new node
    fn add_node(&self, node: Node);
}

/// In-memory graph store
///
/// Enforces the single-connection rule for input ports: adding an edge to
/// an occupied `(target node, target port)` replaces the previous edge.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<WorkflowGraph>,
}

impl InMemoryGraphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding an existing graph
    ///
    /// Duplicate edges into the same input port are collapsed, keeping the
    /// last one.
    pub fn from_graph(graph: WorkflowGraph) -> Self {
        let store = Self {
            graph: RwLock::new(WorkflowGraph {
                nodes: graph.nodes,
                edges: Vec::new(),
            }),
        };
        for edge in graph.edges {
            store.add_edge(edge);
        }
        store
    }

    /// Clone the current graph
    pub fn snapshot(&self) -> WorkflowGraph {
        self.graph.read().clone()
    }

    /// Connect two ports, returning the edge it displaced, if any
    pub fn add_edge(&self, edge: Edge) -> Option<Edge> {
        let mut graph = self.graph.write();
        let displaced = graph
            .edges
            .iter()
            .position(|e| e.targets(&edge.target_node_id, &edge.target_port_id))
            .map(|pos| graph.edges.remove(pos));

        if let Some(old) = &displaced {
            log::debug!(
                "Replacing edge '{}' into {}.{}",
                old.id,
                edge.target_node_id,
                edge.target_port_id
            );
        }
        graph.edges.push(edge);
        displaced
    }

    /// Remove an edge by ID
    pub fn remove_edge(&self, edge_id: &str) -> Option<Edge> {
        let mut graph = self.graph.write();
        let pos = graph.edges.iter().position(|e| e.id == edge_id)?;
        Some(graph.edges.remove(pos))
    }

    /// Remove a node together with every edge attached to it
    pub fn remove_node(&self, node_id: &str) -> Option<Node> {
        let mut graph = self.graph.write();
        let pos = graph.nodes.iter().position(|n| n.id == node_id)?;
        graph
            .edges
            .retain(|e| e.source_node_id != node_id && e.target_node_id != node_id);
        Some(graph.nodes.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.graph.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().nodes.is_empty()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn get_node_by_id(&self, id: &str) -> Option<Node> {
        self.graph.read().find_node(id).cloned()
    }

    fn get_input_edges(&self, node_id: &str) -> Vec<Edge> {
        self.graph.read().incoming_edges(node_id).cloned().collect()
    }

    fn nodes(&self) -> Vec<Node> {
        self.graph.read().nodes.clone()
    }

    fn edges(&self) -> Vec<Edge> {
        self.graph.read().edges.clone()
    }

    fn update_node(&self, id: &str, patch: NodePatch) -> bool {
        let mut graph = self.graph.write();
        match graph.find_node_mut(id) {
            Some(node) => {
                patch.apply(node);
                true
            }
            None => false,
        }
    }

    fn add_node(&self, node: Node) {
        let mut graph = self.graph.write();
        if let Some(existing) = graph.find_node_mut(&node.id) {
            log::warn!("Node '{}' already exists; replacing it", node.id);
            *existing = node;
        } else {
            graph.nodes.push(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeStatus;

    fn store_with_nodes() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store.add_node(Node::new("i1", "image"));
        store.add_node(Node::new("i2", "image"));
        store.add_node(Node::new("m1", "model"));
        store
    }

    #[test]
    fn test_add_edge_replaces_occupied_port() {
        let store = store_with_nodes();
        assert!(store.add_edge(Edge::new("e1", "i1", "image", "m1", "image")).is_none());

        let displaced = store.add_edge(Edge::new("e2", "i2", "image", "m1", "image"));
        assert_eq!(displaced.map(|e| e.id), Some("e1".to_string()));

        let inputs = store.get_input_edges("m1");
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].source_node_id, "i2");
    }

    #[test]
    fn test_different_ports_do_not_conflict() {
        let store = store_with_nodes();
        store.add_node(Node::new("p1", "prompt"));
        store.add_edge(Edge::new("e1", "i1", "image", "m1", "image"));
        store.add_edge(Edge::new("e2", "p1", "text", "m1", "positive_prompt"));
        assert_eq!(store.get_input_edges("m1").len(), 2);
    }

    #[test]
    fn test_from_graph_collapses_duplicate_port_edges() {
        let mut graph = WorkflowGraph::new();
        graph.nodes.push(Node::new("i1", "image"));
        graph.nodes.push(Node::new("i2", "image"));
        graph.nodes.push(Node::new("m1", "model"));
        graph.edges.push(Edge::new("e1", "i1", "image", "m1", "image"));
        graph.edges.push(Edge::new("e2", "i2", "image", "m1", "image"));

        let store = InMemoryGraphStore::from_graph(graph);
        let edges = store.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, "e2");
    }

    #[test]
    fn test_update_node_patch() {
        let store = store_with_nodes();
        assert!(store.update_node("m1", NodePatch::new().status(NodeStatus::Running)));
        assert_eq!(store.get_node_by_id("m1").unwrap().status, NodeStatus::Running);
        assert!(!store.update_node("missing", NodePatch::new().status(NodeStatus::Running)));
    }

    #[test]
    fn test_remove_node_drops_attached_edges() {
        let store = store_with_nodes();
        store.add_edge(Edge::new("e1", "i1", "image", "m1", "image"));
        assert!(store.remove_node("i1").is_some());
        assert!(store.edges().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_nodes_keep_insertion_order() {
        let store = store_with_nodes();
        let ids: Vec<String> = store.nodes().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["i1", "i2", "m1"]);
    }
}
