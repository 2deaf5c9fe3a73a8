//! Hypothesis generation: three independently worded prompts per abstract.

use abstra_model::{GenerationService, ASSISTANT_MARKER};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Number of hypotheses produced per abstract.
pub const HYPOTHESES_PER_ABSTRACT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// 1-based, unique within an abstract.
    pub hypothesis_id: u32,
    pub hypothesis_text: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HypothesisGenerator;

impl HypothesisGenerator {
    pub fn new() -> Self {
        Self
    }

    /// The three prompts, in the order their hypotheses are numbered.
    pub fn prompts(abstract_text: &str, title: &str) -> [String; HYPOTHESES_PER_ABSTRACT] {
        [
            format!(
                "Read this scientific paper abstract and identify its main hypothesis.\n\nTitle: {title}\nAbstract: {abstract_text}\n\nWhat is the main hypothesis?"
            ),
            format!(
                "Based on this abstract titled '{title}', what is the central hypothesis being tested?\n\nAbstract: {abstract_text}"
            ),
            format!(
                "Scientific Abstract: {abstract_text}\nTitle: {title}\n\nExtract the primary research hypothesis. Be specific."
            ),
        ]
    }

    /// Generate one hypothesis per prompt. Failed generations come back as
    /// empty hypotheses rather than errors.
    pub fn generate(
        &self,
        service: &mut GenerationService,
        abstract_text: &str,
        title: &str,
    ) -> Vec<Hypothesis> {
        Self::prompts(abstract_text, title)
            .iter()
            .enumerate()
            .map(|(i, prompt)| {
                let raw = service.generate(prompt, None);
                let text = strip_assistant_marker(&raw);
                if text.is_empty() {
                    warn!("hypothesis {} came back empty", i + 1);
                } else {
                    debug!("hypothesis {}: {} chars", i + 1, text.len());
                }
                Hypothesis {
                    hypothesis_id: (i + 1) as u32,
                    hypothesis_text: text,
                }
            })
            .collect()
    }
}

/// Keep only what follows the first assistant turn marker, if one leaked
/// into the generated text.
///
/// Everything after the first marker is kept, later markers included. The
/// reply is never cut short at a second marker, so a hypothesis that echoes
/// the template still reaches attribution whole.
pub fn strip_assistant_marker(text: &str) -> String {
    match text.split_once(ASSISTANT_MARKER) {
        Some((_, after)) => after.trim().to_string(),
        None => text.to_string(),
    }
}
