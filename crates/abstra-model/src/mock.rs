//! Deterministic in-process backend.
//!
//! Used for dry runs of the full pipeline without a model server and as a
//! building block in tests. Scoring is lexical: the more of the target's
//! words the context contains, the higher the log-likelihood, so
//! attribution over the mock still points at the sentences a hypothesis
//! borrows from.

use crate::{ModelBackend, ModelConfig, ModelError, ModelInfo, ModelSession, SamplingParams};
use crate::{Device, Precision};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Probability floor for a target word the context never mentions.
const UNSEEN_WORD_PROB: f64 = 0.05;

pub struct MockBackend {
    model: String,
    precision: Precision,
    device: Device,
    responses: Arc<Vec<String>>,
    cursor: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Replies are derived from the prompt itself.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            model: config.name.clone(),
            precision: config.dtype,
            device: config.device,
            responses: Arc::new(Vec::new()),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replies cycle through `responses` in order, across reloads.
    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            model: "mock".to_string(),
            precision: Precision::Float32,
            device: Device::Cpu,
            responses: Arc::new(responses),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::scripted(vec![response.to_string()])
    }
}

impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        Ok(Box::new(MockSession {
            info: ModelInfo {
                name: self.model.clone(),
                backend: "mock".to_string(),
                precision: self.precision,
                device: self.device,
            },
            responses: self.responses.clone(),
            cursor: self.cursor.clone(),
        }))
    }
}

pub struct MockSession {
    info: ModelInfo,
    responses: Arc<Vec<String>>,
    cursor: Arc<AtomicUsize>,
}

impl ModelSession for MockSession {
    fn chat(&mut self, prompt: &str, _params: &SamplingParams) -> Result<String, ModelError> {
        if self.responses.is_empty() {
            return Ok(derived_reply(prompt));
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses[idx % self.responses.len()].clone())
    }

    fn log_likelihood(&mut self, context: &str, target: &str) -> Result<f64, ModelError> {
        let target_words = words(target);
        if target_words.is_empty() {
            return Err(ModelError::Unsupported("empty target".to_string()));
        }
        let context_words: HashSet<String> = words(context).into_iter().collect();
        let total: f64 = target_words
            .iter()
            .map(|w| {
                if context_words.contains(w) {
                    0.0
                } else {
                    UNSEEN_WORD_PROB.ln()
                }
            })
            .sum();
        Ok(total)
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Evaluation prompts get a rating line; anything else is treated as a
/// hypothesis request and answered from the first abstract sentence.
fn derived_reply(prompt: &str) -> String {
    if prompt.contains("FINAL SCORE") {
        return "The hypothesis follows the abstract closely.\nFINAL SCORE: 0.7".to_string();
    }
    let abstract_text = prompt
        .lines()
        .find_map(|l| {
            l.strip_prefix("Abstract:")
                .or_else(|| l.strip_prefix("Scientific Abstract:"))
        })
        .map(str::trim)
        .unwrap_or("");
    let first = abstract_text
        .split_inclusive('.')
        .next()
        .map(str::trim)
        .unwrap_or("");
    if first.is_empty() {
        "The study tests whether the proposed effect exists.".to_string()
    } else {
        format!("The central hypothesis is that {first}")
    }
}
