//! Core types for workflow graphs
//!
//! These types define the structure of workflow graphs, including
//! nodes, edges, ports, cached outputs, and their metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Unique identifier for a port
pub type PortId = String;

/// Open key/value configuration of a node instance
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Last successful outputs of a node, keyed by output port
pub type OutputCache = HashMap<PortId, PortValue>;

/// Default node size on the canvas
pub const DEFAULT_NODE_SIZE: f64 = 200.0;

/// The data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Accepts any type
    Any,
    /// Text string
    String,
    /// Image reference (URL or base64 data URL)
    Image,
    /// Generic tensor
    Tensor,
    /// Numeric value
    Number,
    /// Mesh reference
    Mesh,
}

impl PortDataType {
    /// Check if this type can connect to another type
    pub fn is_compatible_with(&self, other: &PortDataType) -> bool {
        // Any type is compatible with everything
        if matches!(self, PortDataType::Any) || matches!(other, PortDataType::Any) {
            return true;
        }

        // Exact type match
        self == other
    }
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Unique identifier for this port
    pub id: PortId,
    /// Human-readable label
    pub label: String,
    /// Data type of the port
    pub data_type: PortDataType,
    /// Whether this port is required (for inputs)
    pub required: bool,
}

impl PortDefinition {
    /// Create a required port
    pub fn required(
        id: impl Into<String>,
        label: impl Into<String>,
        data_type: PortDataType,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            required: true,
        }
    }

    /// Create an optional port
    pub fn optional(
        id: impl Into<String>,
        label: impl Into<String>,
        data_type: PortDataType,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            required: false,
        }
    }
}

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Input nodes (prompt text, source images)
    Input,
    /// Output nodes (generated images and meshes)
    Output,
    /// Processing nodes (diffusion, mesh reconstruction, passthroughs)
    Processing,
}

/// Definition of a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique type identifier (e.g., "model")
    pub node_type: String,
    /// Category for grouping in UI
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Input port definitions
    pub inputs: Vec<PortDefinition>,
    /// Output port definitions
    pub outputs: Vec<PortDefinition>,
}

impl NodeDefinition {
    pub fn input(&self, port_id: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    pub fn output(&self, port_id: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.id == port_id)
    }
}

/// Built-in node types, parsed from a node's type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Prompt,
    Image,
    Model,
    TripoSr,
    ImageDisplay,
    Output,
    MeshOutput,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Prompt,
        NodeKind::Image,
        NodeKind::Model,
        NodeKind::TripoSr,
        NodeKind::ImageDisplay,
        NodeKind::Output,
        NodeKind::MeshOutput,
    ];

    /// Parse a type tag; `None` for types without a built-in handler
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "prompt" => Some(Self::Prompt),
            "image" => Some(Self::Image),
            "model" => Some(Self::Model),
            "triposr" => Some(Self::TripoSr),
            "image-display" => Some(Self::ImageDisplay),
            "output" => Some(Self::Output),
            "mesh-output" => Some(Self::MeshOutput),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Image => "image",
            Self::Model => "model",
            Self::TripoSr => "triposr",
            Self::ImageDisplay => "image-display",
            Self::Output => "output",
            Self::MeshOutput => "mesh-output",
        }
    }

    /// Nodes that call the inference provider and need a connected image
    pub fn is_generator(&self) -> bool {
        matches!(self, Self::Model | Self::TripoSr)
    }

    /// Nodes materialized to hold generation results
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output | Self::MeshOutput)
    }
}

/// Lifecycle state of a node, written by the engine during execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Pending,
    Running,
    Complete,
    Error,
}

/// Generated mesh and its optional renders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshAsset {
    pub mesh_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub vertices: u64,
    #[serde(default)]
    pub faces: u64,
}

impl MeshAsset {
    /// Best visual for a thumbnail: preview image, then video, then the mesh itself
    pub fn thumbnail(&self) -> &str {
        self.preview_url
            .as_deref()
            .or(self.video_url.as_deref())
            .unwrap_or(&self.mesh_url)
    }
}

/// A value produced on an output port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PortValue {
    Text(String),
    Image(String),
    Mesh(MeshAsset),
}

impl PortValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&str> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshAsset> {
        match self {
            Self::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node type tag (references a NodeDefinition)
    #[serde(rename = "type")]
    pub node_type: String,
    /// Custom configuration for this instance
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cache: Option<OutputCache>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Node {
    /// Create an idle node at the origin with the default size
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            params: Params::new(),
            status: NodeStatus::Idle,
            error: None,
            output_cache: None,
            x: 0.0,
            y: 0.0,
            width: DEFAULT_NODE_SIZE,
            height: DEFAULT_NODE_SIZE,
            thumbnail_url: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_tag(&self.node_type)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// A cache is trusted only when the node completed and produced something
    pub fn has_valid_cache(&self) -> bool {
        self.status == NodeStatus::Complete
            && self.output_cache.as_ref().is_some_and(|cache| !cache.is_empty())
    }

    pub fn cached_output(&self, port_id: &str) -> Option<&PortValue> {
        self.output_cache.as_ref().and_then(|cache| cache.get(port_id))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Partial node update with shallow-merge semantics
///
/// Fields left as `None` are not touched. `error` and `thumbnail_url` are
/// doubly optional so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub status: Option<NodeStatus>,
    pub error: Option<Option<String>>,
    pub output_cache: Option<OutputCache>,
    pub params: Option<Params>,
    pub thumbnail_url: Option<Option<String>>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn output_cache(mut self, cache: OutputCache) -> Self {
        self.output_cache = Some(cache);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(Some(url.into()));
        self
    }

    /// Merge this patch into a node
    pub fn apply(self, node: &mut Node) {
        if let Some(status) = self.status {
            node.status = status;
        }
        if let Some(error) = self.error {
            node.error = error;
        }
        if let Some(cache) = self.output_cache {
            node.output_cache = Some(cache);
        }
        if let Some(params) = self.params {
            node.params = params;
        }
        if let Some(thumbnail) = self.thumbnail_url {
            node.thumbnail_url = thumbnail;
        }
    }
}

/// An edge connecting an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    pub target_node_id: NodeId,
    pub target_port_id: PortId,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source_node_id: impl Into<String>,
        source_port_id: impl Into<String>,
        target_node_id: impl Into<String>,
        target_port_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            source_port_id: source_port_id.into(),
            target_node_id: target_node_id.into(),
            target_port_id: target_port_id.into(),
        }
    }

    /// Whether this edge feeds the given input port
    pub fn targets(&self, node_id: &str, port_id: &str) -> bool {
        self.target_node_id == node_id && self.target_port_id == port_id
    }
}

/// A complete workflow graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Nodes in insertion order
    pub nodes: Vec<Node>,
    /// Edges connecting nodes
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target_node_id == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source_node_id == node_id)
    }

    /// Get the IDs of nodes that this node depends on (upstream nodes)
    pub fn get_dependencies(&self, node_id: &str) -> Vec<NodeId> {
        self.incoming_edges(node_id)
            .map(|e| e.source_node_id.clone())
            .collect()
    }

    /// Get the IDs of nodes that depend on this node (downstream nodes)
    pub fn get_dependents(&self, node_id: &str) -> Vec<NodeId> {
        self.outgoing_edges(node_id)
            .map(|e| e.target_node_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_data_type_compatibility() {
        assert!(PortDataType::Any.is_compatible_with(&PortDataType::Mesh));
        assert!(PortDataType::Image.is_compatible_with(&PortDataType::Any));
        assert!(PortDataType::Image.is_compatible_with(&PortDataType::Image));
        assert!(!PortDataType::Mesh.is_compatible_with(&PortDataType::Image));
        assert!(!PortDataType::Number.is_compatible_with(&PortDataType::String));
    }

    #[test]
    fn test_node_kind_tags_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(NodeKind::from_tag("upscaler"), None);
        assert!(NodeKind::TripoSr.is_generator());
        assert!(NodeKind::MeshOutput.is_output());
    }

    #[test]
    fn test_valid_cache_requires_complete_status() {
        let mut node = Node::new("n1", "prompt");
        assert!(!node.has_valid_cache());

        let mut cache = OutputCache::new();
        cache.insert("text".to_string(), PortValue::Text("hi".to_string()));
        node.output_cache = Some(cache);
        assert!(!node.has_valid_cache());

        node.status = NodeStatus::Complete;
        assert!(node.has_valid_cache());

        node.output_cache = Some(OutputCache::new());
        assert!(!node.has_valid_cache());
    }

    #[test]
    fn test_patch_shallow_merge() {
        let mut node = Node::new("n1", "model").with_param("seed", 7);
        node.error = Some("old".to_string());

        NodePatch::new()
            .status(NodeStatus::Running)
            .clear_error()
            .apply(&mut node);

        assert_eq!(node.status, NodeStatus::Running);
        assert!(node.error.is_none());
        // Untouched fields stay as they were
        assert_eq!(node.params.get("seed"), Some(&serde_json::json!(7)));
        assert!(node.thumbnail_url.is_none());
    }

    #[test]
    fn test_node_serializes_type_tag() {
        let node = Node::new("i1", "image").with_param("imageUrl", "/test.png");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["status"], "idle");
        assert_eq!(json["params"]["imageUrl"], "/test.png");
    }

    #[test]
    fn test_port_value_tagging() {
        let value = PortValue::Image("/a.png".to_string());
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "image", "value": "/a.png"}));
    }

    #[test]
    fn test_mesh_thumbnail_preference() {
        let mut mesh = MeshAsset {
            mesh_url: "/m.glb".to_string(),
            ..Default::default()
        };
        assert_eq!(mesh.thumbnail(), "/m.glb");
        mesh.video_url = Some("/m.mp4".to_string());
        assert_eq!(mesh.thumbnail(), "/m.mp4");
        mesh.preview_url = Some("/m.png".to_string());
        assert_eq!(mesh.thumbnail(), "/m.png");
    }

    #[test]
    fn test_graph_edges() {
        let mut graph = WorkflowGraph::new();
        graph.nodes.push(Node::new("node1", "image"));
        graph.nodes.push(Node::new("node2", "model").at(300.0, 0.0));
        graph.edges.push(Edge::new("edge1", "node1", "image", "node2", "image"));

        assert_eq!(graph.get_dependencies("node2"), vec!["node1"]);
        assert_eq!(graph.get_dependents("node1"), vec!["node2"]);
        assert_eq!(graph.find_node("node2").unwrap().right(), 500.0);
    }
}
