//! Built-in node handlers
//!
//! One handler per [`NodeKind`]. A handler reads the node's params and the
//! values gathered from its input edges and returns the outputs to cache.
//! Generator handlers (`model`, `triposr`) also call the inference provider
//! and materialize an output node next to the producer.

use std::collections::HashMap;

use inference::{Img2ImgRequest, InferenceProvider, JobContext, MeshRequest};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::LayoutConfig;
use crate::constants::{params, ports};
use crate::error::{NodeEngineError, Result};
use crate::placement;
use crate::store::GraphStore;
use crate::types::{
    MeshAsset, Node, NodeId, NodeKind, NodeStatus, OutputCache, Params, PortId, PortValue,
};

/// Values arriving on a node's input ports
pub type NodeInputs = HashMap<PortId, PortValue>;

/// Largest seed the diffusion backend accepts
pub const MAX_SEED: i64 = u32::MAX as i64;

/// Everything a successful handler run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutcome {
    pub outputs: OutputCache,
    /// Replacement params to persist with the outputs
    pub params: Option<Params>,
    pub thumbnail_url: Option<String>,
    /// Output node materialized by this run
    pub output_node_id: Option<NodeId>,
}

impl NodeOutcome {
    fn output(port: &str, value: PortValue) -> Self {
        let mut outcome = Self::default();
        outcome.outputs.insert(port.to_string(), value);
        outcome
    }
}

/// Collaborators available to handlers during one node run
pub struct HandlerContext<'a> {
    pub store: &'a dyn GraphStore,
    pub provider: &'a dyn InferenceProvider,
    /// Progress and cancellation for provider calls
    pub job: JobContext,
    pub layout: LayoutConfig,
}

/// How a model node's seed changes after each successful generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedControl {
    #[default]
    Fixed,
    Increment,
    Decrement,
    Randomize,
}

impl SeedControl {
    pub fn next_seed(self, seed: i64) -> i64 {
        match self {
            Self::Fixed => seed,
            Self::Increment if seed >= MAX_SEED => 0,
            Self::Increment => seed + 1,
            Self::Decrement if seed <= 0 => MAX_SEED,
            Self::Decrement => seed - 1,
            Self::Randomize => rand::thread_rng().gen_range(0..=MAX_SEED),
        }
    }
}

/// Sampler settings read from a model node's params
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Img2ImgSettings {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub steps: u32,
    pub cfg: f32,
    pub sampler_name: String,
    pub scheduler: String,
    pub denoise: f32,
    pub model_path: Option<String>,
    pub seed_control: SeedControl,
}

impl Default for Img2ImgSettings {
    fn default() -> Self {
        let request = Img2ImgRequest::new("", "");
        Self {
            positive_prompt: request.positive_prompt,
            negative_prompt: request.negative_prompt,
            seed: request.seed,
            steps: request.steps,
            cfg: request.cfg,
            sampler_name: request.sampler_name,
            scheduler: request.scheduler,
            denoise: request.denoise,
            model_path: None,
            seed_control: SeedControl::default(),
        }
    }
}

/// Reconstruction settings read from a triposr node's params
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub foreground_ratio: f32,
    pub mc_resolution: u32,
    pub remove_bg: bool,
    pub chunk_size: u32,
    pub bake_texture: bool,
    pub texture_resolution: u32,
    pub render_video: bool,
    pub render_n_views: u32,
    pub render_resolution: u32,
}

impl Default for MeshSettings {
    fn default() -> Self {
        let request = MeshRequest::new("");
        Self {
            foreground_ratio: request.foreground_ratio,
            mc_resolution: request.mc_resolution,
            remove_bg: request.remove_bg,
            chunk_size: request.chunk_size,
            bake_texture: request.bake_texture,
            texture_resolution: request.texture_resolution,
            render_video: request.render_video,
            render_n_views: request.render_n_views,
            render_resolution: request.render_resolution,
        }
    }
}

impl MeshSettings {
    fn into_request(self, image: String) -> MeshRequest {
        MeshRequest {
            image,
            foreground_ratio: self.foreground_ratio,
            mc_resolution: self.mc_resolution,
            remove_bg: self.remove_bg,
            chunk_size: self.chunk_size,
            bake_texture: self.bake_texture,
            texture_resolution: self.texture_resolution,
            render_video: self.render_video,
            render_n_views: self.render_n_views,
            render_resolution: self.render_resolution,
        }
    }
}

/// Run the handler for a node
///
/// Registered types without a built-in handler produce no outputs.
pub async fn dispatch(
    node: &Node,
    inputs: &NodeInputs,
    ctx: &HandlerContext<'_>,
) -> Result<NodeOutcome> {
    let Some(kind) = node.kind() else {
        log::warn!(
            "No handler for node type '{}' on node '{}'; producing no outputs",
            node.node_type,
            node.id
        );
        return Ok(NodeOutcome::default());
    };

    log::debug!("Executing node '{}' (type '{}')", node.id, kind.tag());

    match kind {
        // Input nodes
        NodeKind::Prompt => Ok(execute_prompt(node)),
        NodeKind::Image => Ok(execute_image(node)),

        // Passthrough
        NodeKind::ImageDisplay => Ok(execute_image_display(inputs)),

        // Generators
        NodeKind::Model => execute_model(node, inputs, ctx).await,
        NodeKind::TripoSr => execute_triposr(node, inputs, ctx).await,

        // Output nodes
        NodeKind::Output => Ok(execute_output(node, inputs)),
        NodeKind::MeshOutput => Ok(execute_mesh_output(node, inputs)),
    }
}

// ---------------------------------------------------------------------------
// Input and passthrough nodes
// ---------------------------------------------------------------------------

fn execute_prompt(node: &Node) -> NodeOutcome {
    let text = node.param_str(params::TEXT).unwrap_or("");
    NodeOutcome::output(ports::TEXT, PortValue::Text(text.to_string()))
}

fn execute_image(node: &Node) -> NodeOutcome {
    let image = node.param_str(params::IMAGE_URL).unwrap_or("");
    NodeOutcome::output(ports::IMAGE, PortValue::Image(image.to_string()))
}

fn execute_image_display(inputs: &NodeInputs) -> NodeOutcome {
    match inputs.get(ports::IMAGE).and_then(PortValue::as_image) {
        Some(image) => NodeOutcome::output(ports::IMAGE, PortValue::Image(image.to_string())),
        None => NodeOutcome::default(),
    }
}

// ---------------------------------------------------------------------------
// Output nodes
// ---------------------------------------------------------------------------

fn execute_output(node: &Node, inputs: &NodeInputs) -> NodeOutcome {
    let mut outcome = NodeOutcome::default();
    let incoming = inputs
        .get(ports::IMAGE)
        .and_then(PortValue::as_image)
        .filter(|image| !image.is_empty());

    if let Some(image) = incoming {
        if node.param_str(params::IMAGE_URL) != Some(image) {
            let mut merged = node.params.clone();
            merged.insert(params::IMAGE_URL.to_string(), Value::from(image));
            outcome.params = Some(merged);
        }
        outcome.thumbnail_url = Some(image.to_string());
    }

    let current = outcome.params.as_ref().unwrap_or(&node.params);
    if let Some(image) = current.get(params::IMAGE_URL).and_then(Value::as_str) {
        if !image.is_empty() {
            outcome
                .outputs
                .insert(ports::IMAGE.to_string(), PortValue::Image(image.to_string()));
        }
    }
    outcome
}

fn execute_mesh_output(node: &Node, inputs: &NodeInputs) -> NodeOutcome {
    let mut outcome = NodeOutcome::default();
    let incoming = inputs
        .get(ports::MESH)
        .and_then(PortValue::as_mesh)
        .filter(|mesh| !mesh.mesh_url.is_empty());

    if let Some(mesh) = incoming {
        if mesh_from_params(&node.params).as_ref() != Some(mesh) {
            let mut merged = node.params.clone();
            write_mesh_params(&mut merged, mesh);
            outcome.params = Some(merged);
        }
        outcome.thumbnail_url = Some(mesh.thumbnail().to_string());
    }

    let current = outcome.params.as_ref().unwrap_or(&node.params);
    if let Some(mesh) = mesh_from_params(current) {
        outcome.outputs.insert(ports::MESH.to_string(), PortValue::Mesh(mesh));
    }
    outcome
}

/// Mesh stored in a mesh-output node's params
pub fn mesh_from_params(source: &Params) -> Option<MeshAsset> {
    let text = |key: &str| {
        source
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let count = |key: &str| source.get(key).and_then(Value::as_u64).unwrap_or(0);

    Some(MeshAsset {
        mesh_url: text(params::MESH_URL)?,
        video_url: text(params::VIDEO_URL),
        preview_url: text(params::PREVIEW_URL),
        vertices: count(params::VERTICES),
        faces: count(params::FACES),
    })
}

fn write_mesh_params(target: &mut Params, mesh: &MeshAsset) {
    target.insert(params::MESH_URL.to_string(), Value::from(mesh.mesh_url.as_str()));
    let optional = [
        (params::VIDEO_URL, &mesh.video_url),
        (params::PREVIEW_URL, &mesh.preview_url),
    ];
    for (key, value) in optional {
        match value {
            Some(url) => target.insert(key.to_string(), Value::from(url.as_str())),
            None => target.remove(key),
        };
    }
    target.insert(params::VERTICES.to_string(), Value::from(mesh.vertices));
    target.insert(params::FACES.to_string(), Value::from(mesh.faces));
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

async fn execute_model(
    node: &Node,
    inputs: &NodeInputs,
    ctx: &HandlerContext<'_>,
) -> Result<NodeOutcome> {
    let image = require_image("Model", inputs)?;
    let settings: Img2ImgSettings = settings_from_params(node)?;

    let positive_prompt = text_input(inputs, ports::POSITIVE_PROMPT)
        .unwrap_or(settings.positive_prompt.as_str())
        .trim()
        .to_string();
    if positive_prompt.is_empty() {
        return Err(NodeEngineError::validation(
            "Model node requires a positive prompt. Enter one or connect a Prompt node.",
        ));
    }
    let negative_prompt = text_input(inputs, ports::NEGATIVE_PROMPT)
        .unwrap_or(settings.negative_prompt.as_str())
        .to_string();

    let request = Img2ImgRequest {
        image,
        positive_prompt,
        negative_prompt,
        seed: settings.seed,
        steps: settings.steps,
        cfg: settings.cfg,
        sampler_name: settings.sampler_name,
        scheduler: settings.scheduler,
        denoise: settings.denoise,
        model_path: settings.model_path.filter(|path| !path.trim().is_empty()),
    };
    if request.effective_steps() < 1 {
        return Err(NodeEngineError::validation(format!(
            "Steps × denoise must give at least one sampling step (steps {} × denoise {}).",
            request.steps, request.denoise
        )));
    }

    log::info!(
        "Model node '{}': img2img with {} steps, cfg {}, seed {}",
        node.id,
        request.steps,
        request.cfg,
        request.seed
    );
    let result = ctx.provider.generate_image_from_image(request, &ctx.job).await?;
    log::debug!(
        "Model node '{}' generated {}x{} in {:.1}s",
        node.id,
        result.width,
        result.height,
        result.time_taken
    );

    let size = placement::image_output_size(result.width, result.height, &ctx.layout);
    let mut output_params = Params::new();
    output_params.insert(params::IMAGE_URL.to_string(), Value::from(result.image.as_str()));
    let output_node_id = materialize_output(
        ctx,
        node,
        NodeKind::Output,
        size,
        output_params,
        PortValue::Image(result.image.clone()),
        result.image.clone(),
    );

    let mut outcome = NodeOutcome::output(ports::IMAGE, PortValue::Image(result.image.clone()));
    let next_seed = settings.seed_control.next_seed(settings.seed);
    if next_seed != settings.seed {
        let mut updated = node.params.clone();
        updated.insert(params::SEED.to_string(), Value::from(next_seed));
        outcome.params = Some(updated);
    }
    outcome.thumbnail_url = Some(result.image);
    outcome.output_node_id = Some(output_node_id);
    Ok(outcome)
}

async fn execute_triposr(
    node: &Node,
    inputs: &NodeInputs,
    ctx: &HandlerContext<'_>,
) -> Result<NodeOutcome> {
    let image = require_image("Image-to-mesh", inputs)?;
    let settings: MeshSettings = settings_from_params(node)?;
    let request = settings.into_request(image);

    log::info!(
        "Triposr node '{}': reconstructing mesh at resolution {}",
        node.id,
        request.mc_resolution
    );
    let result = ctx.provider.generate_mesh_from_image(request, &ctx.job).await?;
    log::debug!(
        "Triposr node '{}' produced {} vertices, {} faces in {:.1}s",
        node.id,
        result.vertices,
        result.faces,
        result.time_taken
    );

    let mesh = MeshAsset {
        mesh_url: result.mesh_path,
        video_url: result.video_url,
        preview_url: result.preview_url,
        vertices: result.vertices,
        faces: result.faces,
    };
    let mut output_params = Params::new();
    write_mesh_params(&mut output_params, &mesh);
    let output_node_id = materialize_output(
        ctx,
        node,
        NodeKind::MeshOutput,
        placement::mesh_output_size(&ctx.layout),
        output_params,
        PortValue::Mesh(mesh.clone()),
        mesh.thumbnail().to_string(),
    );

    let mut outcome = NodeOutcome::output(ports::MESH, PortValue::Mesh(mesh));
    outcome.output_node_id = Some(output_node_id);
    Ok(outcome)
}

/// Add a completed output node holding `value` next to `producer`
fn materialize_output(
    ctx: &HandlerContext<'_>,
    producer: &Node,
    kind: NodeKind,
    size: (f64, f64),
    mut output_params: Params,
    value: PortValue,
    thumbnail: String,
) -> NodeId {
    output_params.insert(
        params::GENERATION_PARAMS.to_string(),
        Value::Object(producer.params.clone()),
    );
    output_params.insert(params::SOURCE_NODE_ID.to_string(), Value::from(producer.id.as_str()));

    let nodes = ctx.store.nodes();
    let siblings = placement::sibling_outputs(&nodes, producer, &ctx.layout);
    let (x, y) = placement::output_position(producer, &siblings, size, &ctx.layout);

    let port = match kind {
        NodeKind::MeshOutput => ports::MESH,
        _ => ports::IMAGE,
    };
    let mut cache = OutputCache::new();
    cache.insert(port.to_string(), value);

    let id = format!("{}-{}", kind.tag(), Uuid::new_v4());
    let mut output = Node::new(id.clone(), kind.tag()).at(x, y).with_size(size.0, size.1);
    output.params = output_params;
    output.status = NodeStatus::Complete;
    output.output_cache = Some(cache);
    output.thumbnail_url = Some(thumbnail);
    ctx.store.add_node(output);

    log::info!(
        "Created {} node '{}' at ({}, {}) for '{}'",
        kind.tag(),
        id,
        x,
        y,
        producer.id
    );
    id
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether a string is something the inference client can load an image from
pub fn is_image_reference(image: &str) -> bool {
    image.starts_with("data:image/")
        || image.starts_with("http://")
        || image.starts_with("https://")
        || image.starts_with('/')
}

fn require_image(node_label: &str, inputs: &NodeInputs) -> Result<String> {
    let image = inputs
        .get(ports::IMAGE)
        .and_then(PortValue::as_image)
        .map(str::trim)
        .unwrap_or("");

    if image.is_empty() {
        return Err(NodeEngineError::validation(format!(
            "{} node requires an input image. Connect an Image node to its image input.",
            node_label
        )));
    }
    if !is_image_reference(image) {
        return Err(NodeEngineError::validation(format!(
            "{} node input image must be a URL or a data URL.",
            node_label
        )));
    }
    Ok(image.to_string())
}

/// Non-empty text arriving on an input port
fn text_input<'a>(inputs: &'a NodeInputs, port: &str) -> Option<&'a str> {
    inputs
        .get(port)
        .and_then(PortValue::as_text)
        .filter(|text| !text.trim().is_empty())
}

fn settings_from_params<T: DeserializeOwned>(node: &Node) -> Result<T> {
    serde_json::from_value(Value::Object(node.params.clone())).map_err(|e| {
        NodeEngineError::InvalidParams {
            node_id: node.id.clone(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use crate::test_support::MockProvider;

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn inputs(entries: &[(&str, PortValue)]) -> NodeInputs {
        entries
            .iter()
            .map(|(port, value)| (port.to_string(), value.clone()))
            .collect()
    }

    fn image_input() -> NodeInputs {
        inputs(&[(ports::IMAGE, PortValue::Image(IMAGE.to_string()))])
    }

    fn context<'a>(
        store: &'a InMemoryGraphStore,
        provider: &'a MockProvider,
    ) -> HandlerContext<'a> {
        HandlerContext {
            store,
            provider,
            job: JobContext::default(),
            layout: LayoutConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_prompt_defaults_to_empty_text() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("p1", "prompt");

        let outcome = dispatch(&node, &NodeInputs::new(), &context(&store, &provider))
            .await
            .unwrap();
        assert_eq!(outcome.outputs.get("text"), Some(&PortValue::Text(String::new())));
    }

    #[tokio::test]
    async fn test_image_emits_url_param() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("i1", "image").with_param("imageUrl", "/test.png");

        let outcome = dispatch(&node, &NodeInputs::new(), &context(&store, &provider))
            .await
            .unwrap();
        assert_eq!(outcome.outputs.get("image"), Some(&PortValue::Image("/test.png".to_string())));
    }

    #[tokio::test]
    async fn test_image_display_passthrough() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let ctx = context(&store, &provider);
        let node = Node::new("d1", "image-display");

        let outcome = dispatch(&node, &image_input(), &ctx).await.unwrap();
        assert_eq!(outcome.outputs.get("image"), Some(&PortValue::Image(IMAGE.to_string())));

        let empty = dispatch(&node, &NodeInputs::new(), &ctx).await.unwrap();
        assert!(empty.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_produces_no_outputs() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("u1", "upscaler");

        let outcome = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap();
        assert_eq!(outcome, NodeOutcome::default());
    }

    #[tokio::test]
    async fn test_model_requires_input_image() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model").with_param("positive_prompt", "a cat");

        let ctx = context(&store, &provider);
        let err = tokio_test::assert_err!(dispatch(&node, &NodeInputs::new(), &ctx).await);
        assert!(err.to_string().contains("input image"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_rejects_non_url_image() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model").with_param("positive_prompt", "a cat");
        let bad = inputs(&[(ports::IMAGE, PortValue::Image("C:\\cat.png".to_string()))]);

        let err = dispatch(&node, &bad, &context(&store, &provider)).await.unwrap_err();
        assert!(err.to_string().contains("URL or a data URL"));
    }

    #[tokio::test]
    async fn test_model_requires_prompt() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model").with_param("positive_prompt", "   ");

        let err = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap_err();
        assert!(err.to_string().contains("positive prompt"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_rejects_zero_effective_steps() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model")
            .with_param("positive_prompt", "a cat")
            .with_param("steps", 4)
            .with_param("denoise", 0.2);

        let err = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap_err();
        assert!(err.to_string().contains("at least one sampling step"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_request_uses_defaults_and_prompt_port() {
        let store = InMemoryGraphStore::new();
        store.add_node(Node::new("m1", "model"));
        let provider = MockProvider::new();
        let node = Node::new("m1", "model").with_param("positive_prompt", "from params");
        let mut port_inputs = image_input();
        port_inputs.insert(
            ports::POSITIVE_PROMPT.to_string(),
            PortValue::Text("from port".to_string()),
        );

        dispatch(&node, &port_inputs, &context(&store, &provider)).await.unwrap();

        let requests = provider.image_requests.lock();
        let request = &requests[0];
        assert_eq!(request.positive_prompt, "from port");
        assert_eq!(request.seed, 42);
        assert_eq!(request.steps, 20);
        assert_eq!(request.cfg, 7.5);
        assert_eq!(request.sampler_name, "euler");
        assert_eq!(request.scheduler, "normal");
        assert_eq!(request.denoise, 0.75);
        assert_eq!(request.negative_prompt, "");
        assert!(request.model_path.is_none());
    }

    #[tokio::test]
    async fn test_model_materializes_output_node() {
        let store = InMemoryGraphStore::new();
        let producer = Node::new("m1", "model")
            .at(0.0, 0.0)
            .with_param("positive_prompt", "a cat")
            .with_param("cfg", 5.0);
        store.add_node(producer.clone());
        let provider = MockProvider::new().with_image_size(768, 512);

        let outcome = dispatch(&producer, &image_input(), &context(&store, &provider))
            .await
            .unwrap();

        let output_id = outcome.output_node_id.unwrap();
        assert!(output_id.starts_with("output-"));
        let output = store.get_node_by_id(&output_id).unwrap();
        assert_eq!(output.status, NodeStatus::Complete);
        assert_eq!((output.width, output.height), (300.0, 200.0));
        assert_eq!((output.x, output.y), (250.0, 0.0));
        assert_eq!(output.param_str("sourceNodeId"), Some("m1"));
        assert_eq!(output.params["generationParams"]["cfg"], 5.0);
        assert!(output.has_valid_cache());
        assert_eq!(output.thumbnail_url, outcome.thumbnail_url);
    }

    #[tokio::test]
    async fn test_model_increments_seed() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model")
            .with_param("positive_prompt", "a cat")
            .with_param("seed", 7)
            .with_param("seed_control", "increment");

        let outcome = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap();
        assert_eq!(outcome.params.unwrap()["seed"], 8);
        assert_eq!(provider.image_requests.lock()[0].seed, 7);
    }

    #[tokio::test]
    async fn test_model_fixed_seed_leaves_params() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model").with_param("positive_prompt", "a cat");

        let outcome = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap();
        assert!(outcome.params.is_none());
    }

    #[tokio::test]
    async fn test_model_invalid_params() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("m1", "model")
            .with_param("positive_prompt", "a cat")
            .with_param("steps", "many");

        let err = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap_err();
        assert!(matches!(err, NodeEngineError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn test_provider_error_passes_through() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new().failing("CUDA out of memory");
        let node = Node::new("m1", "model").with_param("positive_prompt", "a cat");

        let err = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap_err();
        assert_eq!(err.to_string(), "CUDA out of memory");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_triposr_materializes_mesh_output() {
        let store = InMemoryGraphStore::new();
        let producer = Node::new("t1", "triposr").at(100.0, 100.0).with_param("render_video", true);
        store.add_node(producer.clone());
        let provider = MockProvider::new();

        let outcome = dispatch(&producer, &image_input(), &context(&store, &provider))
            .await
            .unwrap();

        {
            let requests = provider.mesh_requests.lock();
            assert!(requests[0].render_video);
            assert_eq!(requests[0].mc_resolution, 256);
            assert_eq!(requests[0].foreground_ratio, 0.85);
        }

        let mesh = outcome.outputs.get("mesh").and_then(PortValue::as_mesh).unwrap();
        assert_eq!(mesh.mesh_url, "/outputs/mesh_1.glb");

        let output = store.get_node_by_id(outcome.output_node_id.as_ref().unwrap()).unwrap();
        assert_eq!(output.node_type, "mesh-output");
        assert_eq!((output.width, output.height), (200.0, 200.0));
        assert_eq!(output.param_str("meshUrl"), Some("/outputs/mesh_1.glb"));
        assert_eq!(output.thumbnail_url.as_deref(), Some("/outputs/mesh_1.mp4"));
    }

    #[tokio::test]
    async fn test_output_merges_incoming_image() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("o1", "output").with_param("imageUrl", "/old.png");

        let outcome = dispatch(&node, &image_input(), &context(&store, &provider)).await.unwrap();
        assert_eq!(outcome.params.unwrap()["imageUrl"], IMAGE);
        assert_eq!(outcome.thumbnail_url.as_deref(), Some(IMAGE));
        assert_eq!(outcome.outputs.get("image"), Some(&PortValue::Image(IMAGE.to_string())));
    }

    #[tokio::test]
    async fn test_output_reemits_own_image() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let ctx = context(&store, &provider);

        let node = Node::new("o1", "output").with_param("imageUrl", "/kept.png");
        let outcome = dispatch(&node, &NodeInputs::new(), &ctx).await.unwrap();
        assert!(outcome.params.is_none());
        assert_eq!(outcome.outputs.get("image"), Some(&PortValue::Image("/kept.png".to_string())));

        let blank = Node::new("o2", "output");
        assert!(dispatch(&blank, &NodeInputs::new(), &ctx).await.unwrap().outputs.is_empty());
    }

    #[tokio::test]
    async fn test_mesh_output_merges_incoming_mesh() {
        let store = InMemoryGraphStore::new();
        let provider = MockProvider::new();
        let node = Node::new("mo1", "mesh-output").with_param("videoUrl", "/stale.mp4");
        let mesh = MeshAsset {
            mesh_url: "/m.glb".to_string(),
            preview_url: Some("/m.png".to_string()),
            ..Default::default()
        };
        let incoming = inputs(&[(ports::MESH, PortValue::Mesh(mesh.clone()))]);

        let outcome = dispatch(&node, &incoming, &context(&store, &provider)).await.unwrap();
        let merged = outcome.params.unwrap();
        assert_eq!(merged["meshUrl"], "/m.glb");
        assert!(merged.get("videoUrl").is_none());
        assert_eq!(outcome.thumbnail_url.as_deref(), Some("/m.png"));
        assert_eq!(outcome.outputs.get("mesh"), Some(&PortValue::Mesh(mesh)));
    }

    #[test]
    fn test_seed_control() {
        assert_eq!(SeedControl::Fixed.next_seed(5), 5);
        assert_eq!(SeedControl::Increment.next_seed(5), 6);
        assert_eq!(SeedControl::Increment.next_seed(MAX_SEED), 0);
        assert_eq!(SeedControl::Decrement.next_seed(5), 4);
        assert_eq!(SeedControl::Decrement.next_seed(0), MAX_SEED);
        for _ in 0..20 {
            let seed = SeedControl::Randomize.next_seed(5);
            assert!((0..=MAX_SEED).contains(&seed));
        }
    }

    #[test]
    fn test_image_reference() {
        assert!(is_image_reference("data:image/png;base64,AAAA"));
        assert!(is_image_reference("https://example.com/a.png"));
        assert!(is_image_reference("/outputs/a.png"));
        assert!(!is_image_reference("a.png"));
        assert!(!is_image_reference("data:text/plain,hi"));
    }
}
