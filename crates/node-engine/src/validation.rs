//! Graph validation
//!
//! Validates graph structure, port types, and proposed connections, and
//! detects cycles. Execution does not require a valid graph; these checks
//! back the editor's connection UI and diagnostics.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::registry::NodeRegistry;
use crate::types::{Edge, Node, PortDataType};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Cycle detected in the graph
    CycleDetected,
    /// A node has an unknown type (not in registry)
    UnknownNodeType { node_id: String, node_type: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// An edge references a port the node type does not have
    UnknownPort {
        edge_id: String,
        node_id: String,
        port_id: String,
    },
    /// An edge connects incompatible port types
    IncompatiblePortTypes {
        edge_id: String,
        source_type: PortDataType,
        target_type: PortDataType,
    },
    /// More than one edge feeds the same input port
    DuplicateInputEdge { node_id: String, port_id: String },
    /// An edge connects a node to itself
    SelfLoop { node_id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::UnknownPort {
                edge_id,
                node_id,
                port_id,
            } => {
                write!(
                    f,
                    "Edge '{}' references unknown port '{}' on node '{}'",
                    edge_id, port_id, node_id
                )
            }
            Self::IncompatiblePortTypes {
                edge_id,
                source_type,
                target_type,
            } => {
                write!(
                    f,
                    "Edge '{}' connects incompatible types: {:?} -> {:?}",
                    edge_id, source_type, target_type
                )
            }
            Self::DuplicateInputEdge { node_id, port_id } => {
                write!(f, "Input '{}' on node '{}' has more than one edge", port_id, node_id)
            }
            Self::SelfLoop { node_id } => write!(f, "Node '{}' is connected to itself", node_id),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a node graph
///
/// Returns all validation errors found (not just the first). Port checks
/// only apply to node types the registry knows.
pub fn validate_workflow(
    nodes: &[Node],
    edges: &[Edge],
    registry: &NodeRegistry,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_edge_references(nodes, edges, &mut errors);
    validate_node_types(nodes, registry, &mut errors);
    validate_ports(nodes, edges, registry, &mut errors);
    validate_single_input_edges(edges, &mut errors);
    if has_cycle(nodes, edges) {
        errors.push(ValidationError::CycleDetected);
    }

    errors
}

/// Check whether a proposed edge may be added to the graph
///
/// The edge may target an occupied input port; adding it replaces the
/// existing connection, so that edge is ignored for the cycle check.
pub fn validate_connection(
    nodes: &[Node],
    edges: &[Edge],
    proposed: &Edge,
    registry: &NodeRegistry,
) -> Result<(), ValidationError> {
    if proposed.source_node_id == proposed.target_node_id {
        return Err(ValidationError::SelfLoop {
            node_id: proposed.source_node_id.clone(),
        });
    }

    let mut errors = Vec::new();
    validate_edge_references(nodes, std::slice::from_ref(proposed), &mut errors);
    validate_ports(nodes, std::slice::from_ref(proposed), registry, &mut errors);
    if let Some(error) = errors.into_iter().next() {
        return Err(error);
    }

    let mut next: Vec<Edge> = edges
        .iter()
        .filter(|e| !e.targets(&proposed.target_node_id, &proposed.target_port_id))
        .cloned()
        .collect();
    next.push(proposed.clone());
    if has_cycle(nodes, &next) {
        return Err(ValidationError::CycleDetected);
    }

    Ok(())
}

/// Check that all edge source/target nodes exist
fn validate_edge_references(nodes: &[Node], edges: &[Edge], errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in edges {
        for node_id in [&edge.source_node_id, &edge.target_node_id] {
            if !node_ids.contains(node_id.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                });
            }
        }
    }
}

/// Check that all nodes have known types in the registry
fn validate_node_types(nodes: &[Node], registry: &NodeRegistry, errors: &mut Vec<ValidationError>) {
    for node in nodes {
        if !registry.has_node_type(&node.node_type) {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
}

/// Check that edges use existing ports with compatible data types
fn validate_ports(
    nodes: &[Node],
    edges: &[Edge],
    registry: &NodeRegistry,
    errors: &mut Vec<ValidationError>,
) {
    let definitions: HashMap<&str, _> = nodes
        .iter()
        .filter_map(|n| registry.lookup(&n.node_type).map(|d| (n.id.as_str(), d)))
        .collect();

    for edge in edges {
        let source = definitions.get(edge.source_node_id.as_str());
        let target = definitions.get(edge.target_node_id.as_str());

        let source_port = source.map(|d| d.output(&edge.source_port_id));
        let target_port = target.map(|d| d.input(&edge.target_port_id));

        if let Some(None) = source_port {
            errors.push(ValidationError::UnknownPort {
                edge_id: edge.id.clone(),
                node_id: edge.source_node_id.clone(),
                port_id: edge.source_port_id.clone(),
            });
        }
        if let Some(None) = target_port {
            errors.push(ValidationError::UnknownPort {
                edge_id: edge.id.clone(),
                node_id: edge.target_node_id.clone(),
                port_id: edge.target_port_id.clone(),
            });
        }

        if let (Some(Some(out)), Some(Some(input))) = (source_port, target_port) {
            if !out.data_type.is_compatible_with(&input.data_type) {
                errors.push(ValidationError::IncompatiblePortTypes {
                    edge_id: edge.id.clone(),
                    source_type: out.data_type,
                    target_type: input.data_type,
                });
            }
        }
    }
}

/// Check that no input port has more than one incoming edge
fn validate_single_input_edges(edges: &[Edge], errors: &mut Vec<ValidationError>) {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut reported: HashSet<(&str, &str)> = HashSet::new();

    for edge in edges {
        let key = (edge.target_node_id.as_str(), edge.target_port_id.as_str());
        if !seen.insert(key) && reported.insert(key) {
            errors.push(ValidationError::DuplicateInputEdge {
                node_id: edge.target_node_id.clone(),
                port_id: edge.target_port_id.clone(),
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn has_cycle(nodes: &[Node], edges: &[Edge]) -> bool {
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        let (source, target) = (edge.source_node_id.as_str(), edge.target_node_id.as_str());
        if !in_degree.contains_key(source) || !in_degree.contains_key(target) {
            continue;
        }
        adjacency.entry(source).or_default().push(target);
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for &target in adjacency.get(node_id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(target) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    visited < in_degree.len()
}
