//! Self-evaluation: the model rates its own hypothesis against the abstract.

use abstra_model::GenerationService;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EVAL_MAX_LENGTH: usize = 1024;

/// Score used when the response carries no usable number.
pub const DEFAULT_SCORE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Always within `[0, 1]`.
    pub score: f64,
    pub raw_text: String,
}

pub struct SelfEvaluator {
    max_length: usize,
    final_score: Regex,
    decimal: Regex,
}

impl Default for SelfEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_EVAL_MAX_LENGTH)
    }
}

impl SelfEvaluator {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            final_score: Regex::new(r"(?i)FINAL SCORE:\s*(\d+\.?\d*)").expect("static regex"),
            decimal: Regex::new(r"\d+\.\d+").expect("static regex"),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn prompt(title: &str, abstract_text: &str, hypothesis: &str) -> String {
        format!(
            "Assess how faithfully the hypothesis below captures the abstract it was drawn from.\n\n\
             Title: {title}\n\
             Abstract: {abstract_text}\n\
             Hypothesis: {hypothesis}\n\n\
             Give a rating between 0.0 and 1.0.\n\
             End your answer with a line of the form \"FINAL SCORE: X.X\"\n"
        )
    }

    /// Never fails: an empty or unparseable response scores [`DEFAULT_SCORE`].
    pub fn evaluate(
        &self,
        service: &mut GenerationService,
        title: &str,
        abstract_text: &str,
        hypothesis: &str,
    ) -> Evaluation {
        let prompt = Self::prompt(title, abstract_text, hypothesis);
        let raw_text = service.generate(&prompt, Some(self.max_length));
        let score = self.parse_score(&raw_text);
        debug!("self-evaluation score {score}");
        Evaluation { score, raw_text }
    }

    /// Extract a score from an evaluation response.
    ///
    /// An explicit `FINAL SCORE:` line wins and is clamped to `[0, 1]` and
    /// rounded to one decimal. Otherwise the first decimal already inside
    /// `[0, 1]` is taken as written. Otherwise [`DEFAULT_SCORE`].
    pub fn parse_score(&self, text: &str) -> f64 {
        if let Some(value) = self
            .final_score
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        {
            return round_one_decimal(value.clamp(0.0, 1.0));
        }

        self.decimal
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .find(|v| (0.0..=1.0).contains(v))
            .unwrap_or(DEFAULT_SCORE)
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
