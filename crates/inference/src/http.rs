//! HTTP job client for the local inference server
//!
//! Generation requests are submitted to the server's job API as multipart
//! forms, then the job is polled until it reaches a terminal state:
//!
//! - `POST /api/jobs/img2img` / `POST /api/jobs/triposr` -> `{ job_id, status }`
//! - `GET /api/jobs/{job_id}` -> status, progress, result or error
//! - `POST /api/jobs/{job_id}/cancel` when the caller aborts

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::constants::routes;
use crate::provider::{InferenceProvider, JobContext, ProviderError};
use crate::types::{
    Img2ImgRequest, Img2ImgResult, JobProgress, JobState, MeshRequest, MeshResult,
};

/// Provider backed by the inference server's job API
pub struct HttpInferenceProvider {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    config: ClientConfig,
}

/// Raw image bytes ready for upload
#[derive(Debug, Clone, PartialEq)]
struct ImagePayload {
    bytes: Vec<u8>,
    mime: String,
}

impl ImagePayload {
    fn file_name(&self) -> String {
        let ext = match self.mime.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        };
        format!("input.{}", ext)
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobSnapshot {
    status: JobState,
    #[serde(default)]
    progress: JobProgress,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JobErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JobErrorBody {
    message: String,
}

impl HttpInferenceProvider {
    /// Create a client for the server described by `config`
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve an image reference into uploadable bytes
    async fn load_image(&self, image: &str) -> Result<ImagePayload, ProviderError> {
        if image.starts_with("data:") {
            return decode_data_url(image);
        }

        let url = resolve_image_url(&self.config, image)?;
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::InvalidImage(format!(
                "could not fetch {} ({})",
                url,
                response.status()
            )));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(ImagePayload { bytes, mime })
    }

    async fn submit(&self, route: &str, form: Form) -> Result<String, ProviderError> {
        let url = self.config.url(route);
        let response = self.http_client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Backend(error_message(status, &body)));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        log::debug!("Submitted job {} to {}", submitted.job_id, route);
        Ok(submitted.job_id)
    }

    async fn fetch_job(&self, job_id: &str) -> Result<JobSnapshot, ProviderError> {
        let url = self.config.url(&format!("{}/{}", routes::JOBS, job_id));
        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Backend(error_message(status, &body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    /// Best-effort cancellation; failures are logged, not returned
    async fn cancel_job(&self, job_id: &str) {
        let url = self.config.url(&format!("{}/{}/cancel", routes::JOBS, job_id));
        match self.http_client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                log::info!("Cancelled job {}", job_id);
            }
            Ok(resp) => {
                log::warn!("Cancel request for job {} returned {}", job_id, resp.status());
            }
            Err(e) => {
                log::warn!("Failed to cancel job {}: {}", job_id, e);
            }
        }
    }

    /// Poll a job until it finishes, forwarding progress as it changes
    async fn wait_for_job(
        &self,
        job_id: &str,
        context: &JobContext,
    ) -> Result<serde_json::Value, ProviderError> {
        let started = Instant::now();
        let mut last_progress: Option<JobProgress> = None;

        loop {
            if context.is_aborted() {
                self.cancel_job(job_id).await;
                return Err(ProviderError::Cancelled);
            }
            if started.elapsed() > self.config.job_timeout() {
                self.cancel_job(job_id).await;
                return Err(ProviderError::Timeout(self.config.job_timeout()));
            }

            let snapshot = self.fetch_job(job_id).await?;
            if last_progress.as_ref() != Some(&snapshot.progress) {
                context.report(snapshot.progress.clone());
                last_progress = Some(snapshot.progress.clone());
            }

            match snapshot.status {
                JobState::Succeeded => {
                    return snapshot.result.ok_or_else(|| {
                        ProviderError::MalformedResponse(format!(
                            "job {} succeeded without a result",
                            job_id
                        ))
                    });
                }
                JobState::Failed => {
                    let message = snapshot
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| format!("Job {} failed", job_id));
                    return Err(ProviderError::Backend(message));
                }
                JobState::Cancelled => return Err(ProviderError::Cancelled),
                JobState::Queued | JobState::Running => {}
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    fn image_part(image: ImagePayload) -> Result<Part, ProviderError> {
        let file_name = image.file_name();
        Ok(Part::bytes(image.bytes)
            .file_name(file_name)
            .mime_str(&image.mime)?)
    }
}

#[async_trait]
impl InferenceProvider for HttpInferenceProvider {
    async fn generate_image_from_image(
        &self,
        request: Img2ImgRequest,
        context: &JobContext,
    ) -> Result<Img2ImgResult, ProviderError> {
        if let Some(model_path) = &request.model_path {
            log::debug!("Job API selects its own checkpoint; ignoring model path '{}'", model_path);
        }

        let image = self.load_image(&request.image).await?;
        if context.is_aborted() {
            return Err(ProviderError::Cancelled);
        }
        let mut form = Form::new().part("image", Self::image_part(image)?);
        for (name, value) in img2img_form_fields(&request) {
            form = form.text(name, value);
        }

        let job_id = self.submit(routes::IMG2IMG_JOBS, form).await?;
        let result = self.wait_for_job(&job_id, context).await?;
        serde_json::from_value(result).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    async fn generate_mesh_from_image(
        &self,
        request: MeshRequest,
        context: &JobContext,
    ) -> Result<MeshResult, ProviderError> {
        let image = self.load_image(&request.image).await?;
        if context.is_aborted() {
            return Err(ProviderError::Cancelled);
        }
        let mut form = Form::new().part("image", Self::image_part(image)?);
        for (name, value) in mesh_form_fields(&request) {
            form = form.text(name, value);
        }

        let job_id = self.submit(routes::TRIPOSR_JOBS, form).await?;
        let result = self.wait_for_job(&job_id, context).await?;
        serde_json::from_value(result).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

/// Decode a `data:<mime>;base64,<payload>` URL
fn decode_data_url(url: &str) -> Result<ImagePayload, ProviderError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ProviderError::InvalidImage("not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProviderError::InvalidImage("data URL has no payload".to_string()))?;
    let mime = header.strip_suffix(";base64").ok_or_else(|| {
        ProviderError::InvalidImage("only base64-encoded data URLs are supported".to_string())
    })?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::InvalidImage(format!("bad base64 payload: {}", e)))?;

    Ok(ImagePayload {
        bytes,
        mime: if mime.is_empty() {
            "image/png".to_string()
        } else {
            mime.to_string()
        },
    })
}

/// Absolute URLs pass through; root-relative paths resolve against the server
fn resolve_image_url(config: &ClientConfig, image: &str) -> Result<String, ProviderError> {
    if image.starts_with("http://") || image.starts_with("https://") {
        Ok(image.to_string())
    } else if image.starts_with('/') {
        Ok(config.url(image))
    } else {
        Err(ProviderError::InvalidImage(format!(
            "unsupported image reference '{}'",
            truncate(image, 48)
        )))
    }
}

fn img2img_form_fields(request: &Img2ImgRequest) -> Vec<(&'static str, String)> {
    vec![
        ("positive_prompt", request.positive_prompt.clone()),
        ("negative_prompt", request.negative_prompt.clone()),
        ("seed", request.seed.to_string()),
        ("steps", request.steps.to_string()),
        ("cfg", request.cfg.to_string()),
        ("sampler_name", request.sampler_name.clone()),
        ("scheduler", request.scheduler.clone()),
        ("denoise", request.denoise.to_string()),
    ]
}

fn mesh_form_fields(request: &MeshRequest) -> Vec<(&'static str, String)> {
    vec![
        ("foreground_ratio", request.foreground_ratio.to_string()),
        ("mc_resolution", request.mc_resolution.to_string()),
        ("remove_bg", request.remove_bg.to_string()),
        ("chunk_size", request.chunk_size.to_string()),
        ("bake_texture", request.bake_texture.to_string()),
        ("texture_resolution", request.texture_resolution.to_string()),
        ("render_video", request.render_video.to_string()),
        ("render_n_views", request.render_n_views.to_string()),
        ("render_resolution", request.render_resolution.to_string()),
    ]
}

/// Prefer the server's `detail` field; fall back to status and raw body
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("Inference server returned {}: {}", status, body.trim()))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
