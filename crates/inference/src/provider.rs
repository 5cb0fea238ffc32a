//! Inference provider abstraction
//!
//! The graph engine never talks to the inference server directly. It calls
//! an [`InferenceProvider`], which may be the HTTP job client in
//! [`crate::http`], an in-process implementation, or a test double.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{Img2ImgRequest, Img2ImgResult, JobProgress, MeshRequest, MeshResult};

/// Error types for provider operations
///
/// Messages are shown to the user as-is, so variants carry the backend's
/// own wording where there is one.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid image reference: {0}")]
    InvalidImage(String),

    #[error("Malformed response from inference server: {0}")]
    MalformedResponse(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job did not finish within {0:?}")]
    Timeout(Duration),
}

/// Callback invoked with progress reports while a job runs
pub type ProgressCallback = Arc<dyn Fn(JobProgress) + Send + Sync>;

/// Shared cancellation flag
///
/// Cloning yields a handle onto the same flag, so a UI "stop" action can
/// hold one clone while a running job polls another.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation request
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-call context handed to a provider
#[derive(Clone, Default)]
pub struct JobContext {
    /// Optional progress sink
    pub progress: Option<ProgressCallback>,
    /// Cancellation flag checked while the job is in flight
    pub abort: AbortSignal,
}

impl JobContext {
    pub fn new(abort: AbortSignal) -> Self {
        Self {
            progress: None,
            abort,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Forward a progress report to the callback, if any
    pub fn report(&self, progress: JobProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Asynchronous generation capability consumed by the graph engine.
///
/// Both operations either return a complete result or fail with a
/// human-readable error; there is no partial-success shape.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Run img2img diffusion on a source image
    async fn generate_image_from_image(
        &self,
        request: Img2ImgRequest,
        context: &JobContext,
    ) -> Result<Img2ImgResult, ProviderError>;

    /// Reconstruct a textured mesh from a single image
    async fn generate_mesh_from_image(
        &self,
        request: MeshRequest,
        context: &JobContext,
    ) -> Result<MeshResult, ProviderError>;
}
