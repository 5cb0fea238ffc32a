//! Inference provider contract for the node graph engine
//!
//! This library defines the two generation capabilities the graph engine
//! depends on and a client for the local inference server:
//! - **img2img**: diffusion from a source image and prompt
//! - **image-to-mesh**: single-image 3D reconstruction
//!
//! # Example
//!
//! ```rust,ignore
//! use inference::{
//!     ClientConfig, HttpInferenceProvider, Img2ImgRequest, InferenceProvider, JobContext,
//! };
//!
//! let provider = HttpInferenceProvider::new(ClientConfig::from_env())?;
//! let request = Img2ImgRequest::new("data:image/png;base64,...", "a cat");
//! let result = provider
//!     .generate_image_from_image(request, &JobContext::default())
//!     .await?;
//! ```

pub mod config;
pub mod constants;
pub mod http;
pub mod provider;
pub mod types;

// Re-exports for convenience
pub use config::ClientConfig;
pub use http::HttpInferenceProvider;
pub use provider::{AbortSignal, InferenceProvider, JobContext, ProgressCallback, ProviderError};
pub use types::{
    Img2ImgRequest, Img2ImgResult, JobProgress, JobState, MeshRequest, MeshResult,
};
