//! Request, result, and progress types for generation jobs

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Image-to-image diffusion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Img2ImgRequest {
    /// Source image: a `data:` URL, an absolute URL, or a server-relative path
    pub image: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub steps: u32,
    /// Classifier-free guidance scale
    pub cfg: f32,
    pub sampler_name: String,
    pub scheduler: String,
    /// Denoise strength in `0.0..=1.0`
    pub denoise: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

impl Img2ImgRequest {
    /// Request with the server's documented defaults for every sampler setting
    pub fn new(image: impl Into<String>, positive_prompt: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            positive_prompt: positive_prompt.into(),
            negative_prompt: String::new(),
            seed: defaults::SEED,
            steps: defaults::STEPS,
            cfg: defaults::CFG,
            sampler_name: defaults::SAMPLER_NAME.to_string(),
            scheduler: defaults::SCHEDULER.to_string(),
            denoise: defaults::DENOISE,
            model_path: None,
        }
    }

    /// Number of sampler steps actually run for this denoise strength
    pub fn effective_steps(&self) -> u32 {
        (self.steps as f32 * self.denoise).floor().max(0.0) as u32
    }
}

/// Result of an image-to-image job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Img2ImgResult {
    /// Generated image reference (usually a `data:image/png;base64,...` URL)
    pub image: String,
    /// Where the server saved the artifact, if it did
    #[serde(default)]
    pub output_path: Option<String>,
    /// Elapsed generation time in seconds
    #[serde(default)]
    pub time_taken: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Single-image-to-mesh request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshRequest {
    pub image: String,
    /// Fraction of the frame the foreground object should occupy (`0.0..=1.0`)
    pub foreground_ratio: f32,
    /// Marching-cubes grid resolution
    pub mc_resolution: u32,
    /// Run automatic background removal before reconstruction
    pub remove_bg: bool,
    pub chunk_size: u32,
    pub bake_texture: bool,
    pub texture_resolution: u32,
    /// Render a turntable video of the mesh
    pub render_video: bool,
    pub render_n_views: u32,
    pub render_resolution: u32,
}

impl MeshRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            foreground_ratio: defaults::FOREGROUND_RATIO,
            mc_resolution: defaults::MC_RESOLUTION,
            remove_bg: defaults::REMOVE_BG,
            chunk_size: defaults::CHUNK_SIZE,
            bake_texture: defaults::BAKE_TEXTURE,
            texture_resolution: defaults::TEXTURE_RESOLUTION,
            render_video: defaults::RENDER_VIDEO,
            render_n_views: defaults::RENDER_N_VIEWS,
            render_resolution: defaults::RENDER_RESOLUTION,
        }
    }
}

/// Result of an image-to-mesh job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshResult {
    /// Mesh file reference (GLB)
    pub mesh_path: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    /// Total elapsed time in seconds
    #[serde(default)]
    pub time_taken: f64,
    /// Time spent on reconstruction alone
    #[serde(default)]
    pub mesh_time: f64,
    /// Time spent rendering the turntable video, when one was requested
    #[serde(default)]
    pub video_time: Option<f64>,
    #[serde(default)]
    pub vertices: u64,
    #[serde(default)]
    pub faces: u64,
}

/// Progress report for a running job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobProgress {
    pub current: u32,
    pub total: u32,
    pub percent: f32,
    /// Free-form stage label reported by the server (e.g., "sampling")
    pub stage: String,
}

impl JobProgress {
    pub fn new(current: u32, total: u32, stage: impl Into<String>) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            current as f32 / total as f32 * 100.0
        };
        Self {
            current,
            total,
            percent,
            stage: stage.into(),
        }
    }

    /// Progress as a fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        (self.percent / 100.0).clamp(0.0, 1.0)
    }
}

/// Lifecycle of a job on the inference server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_img2img_defaults() {
        let request = Img2ImgRequest::new("/test.png", "a cat");
        assert_eq!(request.seed, 42);
        assert_eq!(request.steps, 20);
        assert_eq!(request.sampler_name, "euler");
        assert_eq!(request.scheduler, "normal");
        assert_eq!(request.effective_steps(), 15);
    }

    #[test]
    fn test_effective_steps_rounds_down() {
        let mut request = Img2ImgRequest::new("/test.png", "a cat");
        request.steps = 4;
        request.denoise = 0.2;
        assert_eq!(request.effective_steps(), 0);
    }

    #[test]
    fn test_mesh_result_from_server_payload() {
        let payload = serde_json::json!({
            "status": "success",
            "mesh_path": "/data/output/mesh_1.glb",
            "video_url": null,
            "preview_url": "/data/output/mesh_1_preview.png",
            "time_taken": 12.5,
            "mesh_time": 10.0,
            "video_time": null,
            "vertices": 1200,
            "faces": 2400
        });
        let result: MeshResult = serde_json::from_value(payload).unwrap();
        assert_eq!(result.mesh_path, "/data/output/mesh_1.glb");
        assert_eq!(result.preview_url.as_deref(), Some("/data/output/mesh_1_preview.png"));
        assert!(result.video_url.is_none());
        assert_eq!(result.faces, 2400);
    }

    #[test]
    fn test_job_progress_percent() {
        let progress = JobProgress::new(5, 20, "sampling");
        assert_eq!(progress.percent, 25.0);
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(JobProgress::new(0, 0, "").percent, 0.0);
    }

    #[test]
    fn test_job_state_terminal() {
        let state: JobState = serde_json::from_str("\"succeeded\"").unwrap();
        assert!(state.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
