//! ABSTRA Model: the generation service behind the attribution pipeline.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      GENERATION SERVICE                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   load() ──► ModelBackend ──► Box<dyn ModelSession>              │
//! │                                   │                              │
//! │   generate(prompt) ──────────────►│ chat(prompt, params)         │
//! │   session_mut() (attribution) ───►│ log_likelihood(ctx, target)  │
//! │   reclaim_memory() ──────────────►│ reclaim()                    │
//! │                                   │                              │
//! │   unload() ──► session dropped ◄──┘                              │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Backends are capability objects: the pipeline only ever sees the
//! [`ModelBackend`] / [`ModelSession`] traits, so an HTTP model server,
//! the deterministic [`mock::MockBackend`] or a test stub are interchangeable.

pub mod config;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
pub mod service;
pub mod template;

use serde::{Deserialize, Serialize};

pub use config::{BackendKind, ModelConfig};
pub use service::{GenerationService, GenerationSettings, SessionStats};
pub use template::{ChatTemplate, ASSISTANT_MARKER};

// ============================================================================
// Core Types
// ============================================================================

/// Decoding parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Upper bound on generated tokens.
    pub max_length: usize,
    pub temperature: f32,
    pub repetition_penalty: f32,
}

/// Numeric precision the model weights are served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Float16,
    Float32,
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Float16
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Float16 => write!(f, "float16"),
            Precision::Float32 => write!(f, "float32"),
        }
    }
}

/// Compute device selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
    Mps,
    Auto,
}

impl Default for Device {
    fn default() -> Self {
        Device::Cuda
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
            Device::Mps => "mps",
            Device::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// What a loaded session reports about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub backend: String,
    pub precision: Precision,
    pub device: Device,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load model `{model}`: {reason}")]
    Load { model: String, reason: String },
    #[error("model is not loaded")]
    NotLoaded,
    #[error("API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("unsupported input: {0}")]
    Unsupported(String),
}

// ============================================================================
// Capability Traits
// ============================================================================

/// A source of model sessions. `load` is the only fallible acquisition step;
/// a failure here is fatal for a run.
pub trait ModelBackend: Send {
    fn name(&self) -> &str;

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError>;
}

/// A loaded model plus tokenizer.
pub trait ModelSession: Send {
    /// Single-turn chat generation. Returns decoded text with special tokens
    /// stripped.
    fn chat(&mut self, prompt: &str, params: &SamplingParams) -> Result<String, ModelError>;

    /// Summed log-probability of `target` when it follows `context`.
    fn log_likelihood(&mut self, context: &str, target: &str) -> Result<f64, ModelError>;

    /// Release caches accumulated since the last call. Must be idempotent.
    fn reclaim(&mut self) {}

    fn info(&self) -> ModelInfo;
}

/// Build the backend selected by `config.backend`.
pub fn create_backend(config: &ModelConfig) -> Result<Box<dyn ModelBackend>, ModelError> {
    match config.backend {
        #[cfg(feature = "openai")]
        BackendKind::Openai => Ok(Box::new(openai::OpenAiCompatBackend::new(config.clone()))),
        #[cfg(not(feature = "openai"))]
        BackendKind::Openai => Err(ModelError::Load {
            model: config.name.clone(),
            reason: "built without the `openai` feature".to_string(),
        }),
        BackendKind::Mock => Ok(Box::new(mock::MockBackend::from_config(config))),
    }
}
