//! Configuration types for the inference client

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Connection settings for the HTTP job client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the inference server (e.g., "http://127.0.0.1:8000")
    pub base_url: String,
    /// Delay between job status polls
    pub poll_interval_ms: u64,
    /// Timeout applied to each individual HTTP request
    pub request_timeout_secs: u64,
    /// Give up on a job that has not finished after this long
    pub job_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BACKEND_URL.to_string(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Default configuration with the base URL taken from `DNA_BACKEND_URL` if set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(defaults::BACKEND_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                config.base_url = url.to_string();
            }
        }
        config
    }

    /// Use a different server address
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Join a route or root-relative path onto the base URL
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}
