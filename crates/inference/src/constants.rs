//! Constants shared by the provider contract and the HTTP job client

/// Default values for generation requests and client configuration
pub mod defaults {
    /// Inference server address when nothing else is configured
    pub const BACKEND_URL: &str = "http://127.0.0.1:8000";
    /// Environment variable overriding [`BACKEND_URL`]
    pub const BACKEND_URL_ENV: &str = "DNA_BACKEND_URL";

    pub const POLL_INTERVAL_MS: u64 = 500;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Upper bound on a single job, queue time included
    pub const JOB_TIMEOUT_SECS: u64 = 30 * 60;

    // img2img
    pub const SEED: i64 = 42;
    pub const STEPS: u32 = 20;
    pub const CFG: f32 = 7.5;
    pub const SAMPLER_NAME: &str = "euler";
    pub const SCHEDULER: &str = "normal";
    pub const DENOISE: f32 = 0.75;

    // image-to-mesh
    pub const FOREGROUND_RATIO: f32 = 0.85;
    pub const MC_RESOLUTION: u32 = 256;
    pub const REMOVE_BG: bool = true;
    pub const CHUNK_SIZE: u32 = 8192;
    pub const BAKE_TEXTURE: bool = false;
    pub const TEXTURE_RESOLUTION: u32 = 2048;
    pub const RENDER_VIDEO: bool = false;
    pub const RENDER_N_VIEWS: u32 = 30;
    pub const RENDER_RESOLUTION: u32 = 256;
}

/// Job API routes on the inference server
pub mod routes {
    pub const IMG2IMG_JOBS: &str = "/api/jobs/img2img";
    pub const TRIPOSR_JOBS: &str = "/api/jobs/triposr";
    pub const JOBS: &str = "/api/jobs";
}
