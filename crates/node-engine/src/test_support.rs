//! Shared fixtures for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use inference::{
    AbortSignal, Img2ImgRequest, Img2ImgResult, InferenceProvider, JobContext, JobProgress,
    MeshRequest, MeshResult, ProviderError,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Scriptable provider that records every request it receives
pub struct MockProvider {
    pub image_requests: Mutex<Vec<Img2ImgRequest>>,
    pub mesh_requests: Mutex<Vec<MeshRequest>>,
    /// Pixel size reported for generated images
    pub image_size: (u32, u32),
    /// Fail every call with this backend message
    pub failure: Mutex<Option<String>>,
    /// Block each call until notified
    pub gate: Option<Arc<Notify>>,
    /// Trip this signal when a call completes
    pub abort_after_call: Mutex<Option<AbortSignal>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            image_requests: Mutex::new(Vec::new()),
            mesh_requests: Mutex::new(Vec::new()),
            image_size: (512, 512),
            failure: Mutex::new(None),
            gate: None,
            abort_after_call: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = (width, height);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(self, message: &str) -> Self {
        *self.failure.lock() = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, context: &JobContext) -> Result<usize, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        context.report(JobProgress::new(1, 2, "sampling"));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if context.is_aborted() {
            return Err(ProviderError::Cancelled);
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(ProviderError::Backend(message));
        }
        context.report(JobProgress::new(2, 2, "sampling"));
        if let Some(signal) = self.abort_after_call.lock().as_ref() {
            signal.abort();
        }
        Ok(call)
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn generate_image_from_image(
        &self,
        request: Img2ImgRequest,
        context: &JobContext,
    ) -> Result<Img2ImgResult, ProviderError> {
        self.image_requests.lock().push(request);
        let call = self.run(context).await?;
        Ok(Img2ImgResult {
            image: format!("data:image/png;base64,R0VO{}", call),
            output_path: None,
            time_taken: 1.5,
            width: self.image_size.0,
            height: self.image_size.1,
        })
    }

    async fn generate_mesh_from_image(
        &self,
        request: MeshRequest,
        context: &JobContext,
    ) -> Result<MeshResult, ProviderError> {
        self.mesh_requests.lock().push(request);
        let call = self.run(context).await?;
        Ok(MeshResult {
            mesh_path: format!("/outputs/mesh_{}.glb", call),
            video_url: Some(format!("/outputs/mesh_{}.mp4", call)),
            preview_url: None,
            output_path: None,
            time_taken: 4.0,
            mesh_time: 3.0,
            video_time: Some(1.0),
            vertices: 1024,
            faces: 2048,
        })
    }
}
