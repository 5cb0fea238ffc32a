//! Constants used by the execution engine

/// Default values for engine configuration and node parameters
pub mod defaults {
    /// Shorter side of a materialized image output node
    pub const OUTPUT_BASE_SIZE: f64 = 200.0;
    /// Side of a materialized mesh output node
    pub const MESH_OUTPUT_SIZE: f64 = 200.0;
    /// Horizontal distance between a producer and its output column
    pub const HORIZONTAL_GAP: f64 = 50.0;
    /// Vertical distance between stacked output nodes
    pub const VERTICAL_GAP: f64 = 20.0;
}

/// Parameter keys read from and written to node params
pub mod params {
    pub const TEXT: &str = "text";
    pub const IMAGE_URL: &str = "imageUrl";
    pub const MESH_URL: &str = "meshUrl";
    pub const VIDEO_URL: &str = "videoUrl";
    pub const PREVIEW_URL: &str = "previewUrl";
    pub const VERTICES: &str = "vertices";
    pub const FACES: &str = "faces";
    pub const GENERATION_PARAMS: &str = "generationParams";
    pub const SOURCE_NODE_ID: &str = "sourceNodeId";
    pub const POSITIVE_PROMPT: &str = "positive_prompt";
    pub const SEED: &str = "seed";
}

/// Port names used by the built-in node types
pub mod ports {
    pub const TEXT: &str = "text";
    pub const IMAGE: &str = "image";
    pub const MESH: &str = "mesh";
    pub const POSITIVE_PROMPT: &str = "positive_prompt";
    pub const NEGATIVE_PROMPT: &str = "negative_prompt";
}
