//! Configuration types for the execution engine

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// What to do with a generator node whose image input has no edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconnectedInputPolicy {
    /// Run the node so it fails with a message telling the user what to connect
    #[default]
    Fail,
    /// Leave the node untouched and carry on with the rest of the run
    Skip,
}

/// Geometry used when placing materialized output nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Shorter side of an image output node
    pub output_base_size: f64,
    /// Side of a (square) mesh output node
    pub mesh_output_size: f64,
    pub horizontal_gap: f64,
    pub vertical_gap: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            output_base_size: defaults::OUTPUT_BASE_SIZE,
            mesh_output_size: defaults::MESH_OUTPUT_SIZE,
            horizontal_gap: defaults::HORIZONTAL_GAP,
            vertical_gap: defaults::VERTICAL_GAP,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub unconnected_input_policy: UnconnectedInputPolicy,
    pub layout: LayoutConfig,
}

impl EngineConfig {
    pub fn with_unconnected_input_policy(mut self, policy: UnconnectedInputPolicy) -> Self {
        self.unconnected_input_policy = policy;
        self
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }
}
