//! Node type registry
//!
//! Maps node type tags to their port schema. The engine only uses the
//! registry to check that a node's type is known before dispatching it;
//! connection validation and the UI palette use the port definitions.
//!
//! # Usage
//!
//! ```ignore
//! use node_engine::NodeRegistry;
//!
//! let mut registry = NodeRegistry::with_builtins();
//! registry.register(my_custom_definition);
//! assert!(registry.lookup("model").is_some());
//! ```

use std::collections::HashMap;

use crate::types::{NodeCategory, NodeDefinition, NodeKind, PortDataType, PortDefinition};

/// Registry of node types with their definitions
pub struct NodeRegistry {
    entries: HashMap<String, NodeDefinition>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in node type
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in NodeKind::ALL {
            registry.register(builtin_definition(kind));
        }
        registry
    }

    /// Register a node type, replacing any previous definition for its tag
    pub fn register(&mut self, definition: NodeDefinition) {
        self.entries.insert(definition.node_type.clone(), definition);
    }

    /// Get the definition for a node type
    pub fn lookup(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.entries.get(node_type)
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// Get all registered definitions
    pub fn all_definitions(&self) -> Vec<&NodeDefinition> {
        self.entries.values().collect()
    }

    /// Get definitions grouped by category
    pub fn definitions_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeDefinition>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeDefinition>> = HashMap::new();
        for definition in self.entries.values() {
            grouped.entry(definition.category).or_default().push(definition);
        }
        grouped
    }

    /// List all registered node type strings
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Port schema of a built-in node type
pub fn builtin_definition(kind: NodeKind) -> NodeDefinition {
    let (category, label, description, inputs, outputs) = match kind {
        NodeKind::Prompt => (
            NodeCategory::Input,
            "Prompt",
            "Text prompt entered on the canvas",
            vec![],
            vec![PortDefinition::required("text", "Text", PortDataType::String)],
        ),
        NodeKind::Image => (
            NodeCategory::Input,
            "Image",
            "Uploaded or referenced source image",
            vec![],
            vec![PortDefinition::required("image", "Image", PortDataType::Image)],
        ),
        NodeKind::Model => (
            NodeCategory::Processing,
            "Img2Img Model",
            "Diffusion image-to-image generation",
            vec![
                PortDefinition::required("image", "Image", PortDataType::Image),
                PortDefinition::optional(
                    "positive_prompt",
                    "Positive Prompt",
                    PortDataType::String,
                ),
                PortDefinition::optional(
                    "negative_prompt",
                    "Negative Prompt",
                    PortDataType::String,
                ),
            ],
            vec![PortDefinition::required("image", "Image", PortDataType::Image)],
        ),
        NodeKind::TripoSr => (
            NodeCategory::Processing,
            "Image to Mesh",
            "Single-image 3D mesh reconstruction",
            vec![PortDefinition::required("image", "Image", PortDataType::Image)],
            vec![PortDefinition::required("mesh", "Mesh", PortDataType::Mesh)],
        ),
        NodeKind::ImageDisplay => (
            NodeCategory::Processing,
            "Image Display",
            "Shows the connected image and passes it through",
            vec![PortDefinition::required("image", "Image", PortDataType::Image)],
            vec![PortDefinition::required("image", "Image", PortDataType::Image)],
        ),
        NodeKind::Output => (
            NodeCategory::Output,
            "Output",
            "Generated image; can feed further generations",
            vec![PortDefinition::optional("image", "Image", PortDataType::Image)],
            vec![PortDefinition::required("image", "Image", PortDataType::Image)],
        ),
        NodeKind::MeshOutput => (
            NodeCategory::Output,
            "Mesh Output",
            "Generated mesh with optional preview renders",
            vec![PortDefinition::optional("mesh", "Mesh", PortDataType::Mesh)],
            vec![PortDefinition::required("mesh", "Mesh", PortDataType::Mesh)],
        ),
    };

    NodeDefinition {
        node_type: kind.tag().to_string(),
        category,
        label: label.to_string(),
        description: description.to_string(),
        inputs,
        outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_definition(node_type: &str) -> NodeDefinition {
        NodeDefinition {
            node_type: node_type.to_string(),
            category: NodeCategory::Processing,
            label: format!("Test {}", node_type),
            description: "Test node".to_string(),
            inputs: vec![PortDefinition::optional("input", "Input", PortDataType::Any)],
            outputs: vec![PortDefinition::optional("output", "Output", PortDataType::Any)],
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(registry.all_definitions().len(), 7);
        let tags = [
            "prompt",
            "image",
            "model",
            "triposr",
            "image-display",
            "output",
            "mesh-output",
        ];
        for tag in tags {
            assert!(registry.has_node_type(tag), "missing {}", tag);
        }
        assert!(registry.lookup("upscaler").is_none());
    }

    #[test]
    fn test_model_ports() {
        let registry = NodeRegistry::with_builtins();
        let model = registry.lookup("model").unwrap();
        assert!(model.input("image").unwrap().required);
        assert!(!model.input("positive_prompt").unwrap().required);
        assert_eq!(model.output("image").unwrap().data_type, PortDataType::Image);
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.register(test_definition("test-node"));

        assert!(registry.has_node_type("test-node"));
        assert!(!registry.has_node_type("unknown"));
        assert_eq!(registry.lookup("test-node").unwrap().label, "Test test-node");
    }

    #[test]
    fn test_merge_override() {
        let mut registry1 = NodeRegistry::with_builtins();

        let mut registry2 = NodeRegistry::new();
        let mut custom = test_definition("model");
        custom.label = "Override".to_string();
        registry2.register(custom);
        registry2.register(test_definition("upscaler"));

        registry1.merge(registry2);
        assert_eq!(registry1.node_types().len(), 8);
        assert_eq!(registry1.lookup("model").unwrap().label, "Override");
    }

    #[test]
    fn test_definitions_by_category() {
        let registry = NodeRegistry::with_builtins();
        let grouped = registry.definitions_by_category();
        assert_eq!(grouped.get(&NodeCategory::Input).unwrap().len(), 2);
        assert_eq!(grouped.get(&NodeCategory::Output).unwrap().len(), 2);
        assert_eq!(grouped.get(&NodeCategory::Processing).unwrap().len(), 3);
    }
}
