//! Model section of the run configuration.

use crate::{ChatTemplate, Device, Precision};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL_NAME: &str = "TinyLlama/TinyLlama-1.1B-Chat-v1.0";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_API_KEY_ENV: &str = "ABSTRA_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which backend serves the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible completion server (vLLM and friends).
    Openai,
    /// Deterministic in-process backend for dry runs.
    Mock,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Openai
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub dtype: Precision,
    pub device: Device,
    pub backend: BackendKind,
    pub base_url: String,
    /// Environment variable holding the bearer token, if the server wants one.
    pub api_key_env: String,
    /// 0 disables the request timeout.
    pub timeout_secs: u64,
    /// Render prompts locally with this template instead of relying on the
    /// server's chat endpoint.
    pub chat_template: Option<ChatTemplate>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            dtype: Precision::default(),
            device: Device::default(),
            backend: BackendKind::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            chat_template: None,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Bearer token from `api_key_env`, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}
