//! Run configuration, loaded from YAML.
//!
//! Every section and every field has a default, so an empty file (or a file
//! naming only what differs) is a valid configuration.

use abstra_model::{GenerationSettings, ModelConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::evaluation::DEFAULT_EVAL_MAX_LENGTH;
use crate::hypothesis::HYPOTHESES_PER_ABSTRACT;
use crate::segmentation::SentenceSplitter;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub paths: PathsConfig,
    pub processing: ProcessingConfig,
    pub generation: GenerationConfig,
    pub segmentation: SegmentationConfig,
    pub attribution: AttributionConfig,
    pub evaluation: EvaluationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_csv: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_csv: PathBuf::new(),
            output_dir: PathBuf::from("./results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Informational; the generator always produces three.
    pub num_hypotheses: usize,
    /// Reserved. Processing is sequential.
    pub batch_size: usize,
    pub reload_model_every: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            num_hypotheses: HYPOTHESES_PER_ABSTRACT,
            batch_size: 10,
            reload_model_every: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_length: usize,
    pub temperature: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let defaults = GenerationSettings::default();
        Self {
            max_length: defaults.max_length,
            temperature: defaults.temperature,
            repetition_penalty: defaults.repetition_penalty,
        }
    }
}

impl GenerationConfig {
    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            max_length: self.max_length,
            temperature: self.temperature,
            repetition_penalty: self.repetition_penalty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub splitter: SentenceSplitter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub shapley_samples: usize,
    /// `None` seeds the sampler from OS entropy.
    pub seed: Option<u64>,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            shapley_samples: 10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub max_length: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_EVAL_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `abstra_core=debug,warn`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };
        if self.processing.reload_model_every == 0 {
            return invalid("processing.reload_model_every must be at least 1");
        }
        if self.attribution.shapley_samples == 0 {
            return invalid("attribution.shapley_samples must be at least 1");
        }
        if self.generation.max_length == 0 {
            return invalid("generation.max_length must be at least 1");
        }
        if self.evaluation.max_length == 0 {
            return invalid("evaluation.max_length must be at least 1");
        }
        if !positive(self.generation.temperature) {
            return invalid("generation.temperature must be positive");
        }
        if !positive(self.generation.repetition_penalty) {
            return invalid("generation.repetition_penalty must be positive");
        }
        if self.model.name.trim().is_empty() {
            return invalid("model.name must not be empty");
        }
        if self.processing.num_hypotheses != HYPOTHESES_PER_ABSTRACT {
            warn!(
                "processing.num_hypotheses = {} is ignored; {} hypotheses are generated per abstract",
                self.processing.num_hypotheses, HYPOTHESES_PER_ABSTRACT
            );
        }
        Ok(())
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
