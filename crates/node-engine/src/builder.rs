//! Fluent builder for node graphs
//!
//! Provides a fluent API for constructing graphs programmatically, mostly
//! for tests and for seeding a store.

use crate::store::InMemoryGraphStore;
use crate::types::{Edge, Node, WorkflowGraph};

/// Fluent builder for constructing node graphs
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new()
///     .add_node("i1", "image", (0.0, 0.0))
///     .with_param("imageUrl", "/uploads/cat.png")
///     .add_node("m1", "model", (300.0, 0.0))
///     .with_param("positive_prompt", "a cat in a spacesuit")
///     .add_edge("i1", "image", "m1", "image")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    edge_counter: usize,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the default size
    pub fn add_node(
        mut self,
        id: impl Into<String>,
        node_type: impl Into<String>,
        position: (f64, f64),
    ) -> Self {
        self.nodes
            .push(Node::new(id, node_type).at(position.0, position.1));
        self
    }

    /// Add a fully constructed node
    pub fn add(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Set a param on the most recently added node
    ///
    /// Must be called after `add_node`.
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.params.insert(key.to_string(), value.into());
        }
        self
    }

    /// Add an edge between two nodes (auto-generates edge ID)
    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.edge_counter += 1;
        self.edges.push(Edge::new(
            format!("edge-{}", self.edge_counter),
            source,
            source_port,
            target,
            target_port,
        ));
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> WorkflowGraph {
        WorkflowGraph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }

    /// Build straight into an in-memory store
    pub fn into_store(self) -> InMemoryGraphStore {
        InMemoryGraphStore::from_graph(self.build())
    }
}
