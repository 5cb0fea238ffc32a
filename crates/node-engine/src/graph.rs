//! Dependency graph with dirty tracking
//!
//! An [`ExecutionGraph`] is rebuilt from a store snapshot at the start of
//! every run and thrown away afterwards. It answers two questions:
//!
//! - **Which nodes need work?** A node is dirty unless it already completed
//!   with a non-empty output cache. Dirtiness then flows forward, so anything
//!   downstream of a dirty node is recomputed too.
//! - **In what order?** A depth-first topological sort restricted to the
//!   dirty subset, deterministic for a fixed node insertion order.
//!
//! Both traversals use explicit stacks and visited sets, so deep chains do
//! not grow the call stack and cycles cannot loop forever.

use std::collections::{HashMap, HashSet};

use crate::types::{Edge, Node, NodeId};

/// Per-run bookkeeping for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionNode {
    pub id: NodeId,
    /// Upstream nodes, in edge order
    pub dependencies: Vec<NodeId>,
    /// Downstream nodes, in edge order
    pub dependents: Vec<NodeId>,
    pub dirty: bool,
}

/// Result of a topological sort
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologicalOrder {
    /// Dirty nodes, each after all of its dependencies
    pub order: Vec<NodeId>,
    /// Back edges `(from, to)` skipped because they close a cycle
    pub back_edges: Vec<(NodeId, NodeId)>,
}

/// Dependency graph rebuilt for each execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    nodes: HashMap<NodeId, ExecutionNode>,
    /// Node IDs in store insertion order
    order: Vec<NodeId>,
}

impl ExecutionGraph {
    /// Build from a snapshot of the store's nodes and edges
    ///
    /// Edges whose endpoints are not in `nodes` are ignored.
    pub fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut graph = Self {
            nodes: HashMap::with_capacity(nodes.len()),
            order: Vec::with_capacity(nodes.len()),
        };

        for node in nodes {
            if graph.nodes.contains_key(&node.id) {
                continue;
            }
            graph.order.push(node.id.clone());
            graph.nodes.insert(
                node.id.clone(),
                ExecutionNode {
                    id: node.id.clone(),
                    dependencies: Vec::new(),
                    dependents: Vec::new(),
                    dirty: !node.has_valid_cache(),
                },
            );
        }

        for edge in edges {
            let source = edge.source_node_id.as_str();
            let target = edge.target_node_id.as_str();
            if !graph.nodes.contains_key(source) || !graph.nodes.contains_key(target) {
                log::debug!("Ignoring edge '{}' with a missing endpoint", edge.id);
                continue;
            }
            if let Some(node) = graph.nodes.get_mut(target) {
                if !node.dependencies.iter().any(|d| d == source) {
                    node.dependencies.push(source.to_string());
                }
            }
            if let Some(node) = graph.nodes.get_mut(source) {
                if !node.dependents.iter().any(|d| d == target) {
                    node.dependents.push(target.to_string());
                }
            }
        }

        let initially_dirty = graph.dirty_nodes();
        graph.spread_dirty(initially_dirty);

        graph
    }

    /// Mark a node and everything downstream of it dirty
    ///
    /// Returns the IDs reached, starting with `node_id`. Unknown IDs reach
    /// nothing.
    pub fn mark_dirty(&mut self, node_id: &str) -> Vec<NodeId> {
        if !self.nodes.contains_key(node_id) {
            return Vec::new();
        }
        self.spread_dirty(vec![node_id.to_string()])
    }

    /// Flood fill from all `seeds` at once through `dependents`
    ///
    /// One visited set is shared by every seed, so each node is reached at
    /// most once. Returns the reached IDs in visit order.
    fn spread_dirty(&mut self, seeds: Vec<NodeId>) -> Vec<NodeId> {
        let mut reached = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        // Reversed so the first seed is popped first
        let mut stack: Vec<NodeId> = seeds.into_iter().rev().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            node.dirty = true;
            // Reverse so dependents are visited in edge order
            for dependent in node.dependents.iter().rev() {
                if !visited.contains(dependent) {
                    stack.push(dependent.clone());
                }
            }
            reached.push(id);
        }

        reached
    }

    /// Mark a node as up to date
    pub fn mark_clean(&mut self, node_id: &str) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.dirty = false;
        }
    }

    pub fn is_dirty(&self, node_id: &str) -> bool {
        self.nodes.get(node_id).is_some_and(|n| n.dirty)
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionNode> {
        self.nodes.get(node_id)
    }

    /// Dirty node IDs in insertion order
    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| self.is_dirty(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Dirty nodes ordered so every dependency comes first
    pub fn topological_sort(&self) -> Vec<NodeId> {
        self.sort().order
    }

    /// Back edges `(from, to)` that close a cycle
    pub fn cycles_detected(&self) -> Vec<(NodeId, NodeId)> {
        self.sort().back_edges
    }

    /// Depth-first topological sort over the whole graph, emitting only
    /// dirty nodes
    ///
    /// Clean nodes are still traversed so ordering holds transitively
    /// through them. A dependency that is already on the DFS path closes a
    /// cycle; it is logged, recorded as a back edge, and not followed.
    pub fn sort(&self) -> TopologicalOrder {
        let mut result = TopologicalOrder::default();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_path: HashSet<&str> = HashSet::new();

        for root in &self.order {
            if visited.contains(root.as_str()) {
                continue;
            }

            // (node, index of the next dependency to visit)
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            on_path.insert(root.as_str());

            while let Some(frame) = stack.last_mut() {
                let (id, next) = *frame;
                let Some(node) = self.nodes.get(id) else {
                    stack.pop();
                    on_path.remove(id);
                    continue;
                };

                if let Some(dep) = node.dependencies.get(next) {
                    frame.1 += 1;
                    let dep = dep.as_str();
                    if visited.contains(dep) {
                        continue;
                    }
                    if on_path.contains(dep) {
                        log::warn!(
                            "Cycle detected: '{}' depends on '{}' which is already being visited",
                            id,
                            dep
                        );
                        result.back_edges.push((dep.to_string(), id.to_string()));
                        continue;
                    }
                    on_path.insert(dep);
                    stack.push((dep, 0));
                } else {
                    stack.pop();
                    on_path.remove(id);
                    visited.insert(id);
                    if node.dirty {
                        result.order.push(id.to_string());
                    }
                }
            }
        }

        result
    }
}
