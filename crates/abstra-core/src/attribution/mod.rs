//! Section-level attribution of a hypothesis to the abstract that produced it.
//!
//! ```text
//!  SectionMap ──flatten──► [s0 s1 s2 … sN]   spans: background=[0,a) objective=[a,b) …
//!                               │
//!                     SentenceTemplate (one removable unit per sentence)
//!                               │
//!              Attributor::ablate / Attributor::sample_attribute
//!                               │
//!                      [v0 v1 v2 … vN]  one signed value per sentence
//!                               │
//!                  mean over each span (0.0 for an empty span)
//!                               ▼
//!                         SectionScores
//! ```
//!
//! Attribution is best-effort: any failure inside an algorithm is logged and
//! turned into all-zero scores so a batch never stops on one hypothesis.

pub mod ablation;
pub mod shapley;

use crate::section::{Section, SectionMap, SectionScores, SectionSpans};
use abstra_model::{GenerationService, ModelError, ModelSession};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::{debug, error};

pub use ablation::feature_ablation;
pub use shapley::shapley_value_sampling;

#[derive(Debug, thiserror::Error)]
pub enum AttributionError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("non-finite attribution value")]
    NonFinite,
    #[error("expected {expected} attribution values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// Template
// ============================================================================

/// Sentences as independently removable units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceTemplate {
    units: Vec<String>,
}

impl SentenceTemplate {
    pub fn new(units: Vec<String>) -> Self {
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Text with only the units selected by `mask`, space separated.
    /// Removed units contribute nothing (empty baseline).
    pub fn render(&self, mask: &[bool]) -> String {
        self.units
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(u, _)| u.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render_all(&self) -> String {
        self.units.join(" ")
    }
}

// ============================================================================
// Attributor seam
// ============================================================================

/// A pair of attribution algorithms driven by a loaded model. Each returns
/// one signed value per template unit.
pub trait Attributor {
    fn ablate(
        &mut self,
        model: &mut dyn ModelSession,
        input: &SentenceTemplate,
        target: &str,
    ) -> Result<Vec<f64>, AttributionError>;

    fn sample_attribute(
        &mut self,
        model: &mut dyn ModelSession,
        input: &SentenceTemplate,
        target: &str,
        n_samples: usize,
    ) -> Result<Vec<f64>, AttributionError>;
}

/// Default attributor: coalitions are scored by the model's log-likelihood
/// of the target given the rendered coalition text.
pub struct PerturbationAttributor {
    rng: StdRng,
}

impl PerturbationAttributor {
    /// `None` seeds from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

/// Memoises coalition values for the duration of one attribution call.
struct CoalitionCache<'a> {
    model: &'a mut dyn ModelSession,
    input: &'a SentenceTemplate,
    target: &'a str,
    values: HashMap<Vec<bool>, f64>,
}

impl<'a> CoalitionCache<'a> {
    fn new(model: &'a mut dyn ModelSession, input: &'a SentenceTemplate, target: &'a str) -> Self {
        Self {
            model,
            input,
            target,
            values: HashMap::new(),
        }
    }

    fn value(&mut self, mask: &[bool]) -> Result<f64, AttributionError> {
        if let Some(v) = self.values.get(mask) {
            return Ok(*v);
        }
        let v = self
            .model
            .log_likelihood(&self.input.render(mask), self.target)?;
        if !v.is_finite() {
            return Err(AttributionError::NonFinite);
        }
        self.values.insert(mask.to_vec(), v);
        Ok(v)
    }

    fn evaluations(&self) -> usize {
        self.values.len()
    }
}

impl Attributor for PerturbationAttributor {
    fn ablate(
        &mut self,
        model: &mut dyn ModelSession,
        input: &SentenceTemplate,
        target: &str,
    ) -> Result<Vec<f64>, AttributionError> {
        let mut cache = CoalitionCache::new(model, input, target);
        let values = feature_ablation(input.len(), |mask| cache.value(mask))?;
        debug!("ablation scored {} coalitions", cache.evaluations());
        Ok(values)
    }

    fn sample_attribute(
        &mut self,
        model: &mut dyn ModelSession,
        input: &SentenceTemplate,
        target: &str,
        n_samples: usize,
    ) -> Result<Vec<f64>, AttributionError> {
        let mut cache = CoalitionCache::new(model, input, target);
        let values = shapley_value_sampling(input.len(), n_samples, &mut self.rng, |mask| {
            cache.value(mask)
        })?;
        debug!(
            "shapley sampling ({n_samples} samples) scored {} coalitions",
            cache.evaluations()
        );
        Ok(values)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// How a score map came to be. The persisted scores are 0.0 for every
/// outcome but `Computed`; this keeps the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionOutcome {
    Computed,
    /// The abstract had no sentences.
    NoText,
    /// The hypothesis was blank.
    EmptyTarget,
    Failed(String),
}

impl AttributionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, AttributionOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionAttribution {
    pub scores: SectionScores,
    pub outcome: AttributionOutcome,
}

impl SectionAttribution {
    fn zeros(outcome: AttributionOutcome) -> Self {
        Self {
            scores: SectionScores::zeros(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Ablation,
    Sampling { n_samples: usize },
}

impl Method {
    fn label(&self) -> &'static str {
        match self {
            Method::Ablation => "FA",
            Method::Sampling { .. } => "Shapley",
        }
    }
}

pub struct AttributionEngine {
    attributor: Box<dyn Attributor>,
}

impl AttributionEngine {
    pub fn new(attributor: Box<dyn Attributor>) -> Self {
        Self { attributor }
    }

    /// Engine over the default [`PerturbationAttributor`].
    pub fn with_seed(seed: Option<u64>) -> Self {
        Self::new(Box::new(PerturbationAttributor::new(seed)))
    }

    pub fn ablation_scores(
        &mut self,
        service: &mut GenerationService,
        sections: &SectionMap,
        hypothesis: &str,
    ) -> SectionAttribution {
        self.run(Method::Ablation, service, sections, hypothesis)
    }

    pub fn sampling_scores(
        &mut self,
        service: &mut GenerationService,
        sections: &SectionMap,
        hypothesis: &str,
        n_samples: usize,
    ) -> SectionAttribution {
        self.run(Method::Sampling { n_samples }, service, sections, hypothesis)
    }

    fn run(
        &mut self,
        method: Method,
        service: &mut GenerationService,
        sections: &SectionMap,
        hypothesis: &str,
    ) -> SectionAttribution {
        let (sentences, spans) = sections.flatten();
        if sentences.is_empty() {
            return SectionAttribution::zeros(AttributionOutcome::NoText);
        }
        if hypothesis.trim().is_empty() {
            debug!("{}: blank hypothesis, nothing to attribute", method.label());
            return SectionAttribution::zeros(AttributionOutcome::EmptyTarget);
        }

        let template = SentenceTemplate::new(sentences);
        let result = match service.session_mut() {
            Ok(session) => match method {
                Method::Ablation => self.attributor.ablate(session, &template, hypothesis),
                Method::Sampling { n_samples } => {
                    self.attributor
                        .sample_attribute(session, &template, hypothesis, n_samples)
                }
            },
            Err(e) => Err(e.into()),
        };

        match result.and_then(|values| reduce_to_sections(&values, &spans, template.len())) {
            Ok(scores) => {
                service.reclaim_memory();
                SectionAttribution {
                    scores,
                    outcome: AttributionOutcome::Computed,
                }
            }
            Err(e) => {
                error!("{} error: {e}", method.label());
                SectionAttribution::zeros(AttributionOutcome::Failed(e.to_string()))
            }
        }
    }
}

/// Mean of the per-unit values over each section's span.
pub fn reduce_to_sections(
    values: &[f64],
    spans: &SectionSpans,
    expected: usize,
) -> Result<SectionScores, AttributionError> {
    if values.len() != expected {
        return Err(AttributionError::ShapeMismatch {
            expected,
            got: values.len(),
        });
    }
    let mut scores = SectionScores::zeros();
    for section in Section::ALL {
        let (start, end) = spans.get(section);
        if end > start {
            let slice = &values[start..end];
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            if !mean.is_finite() {
                return Err(AttributionError::NonFinite);
            }
            scores.set(section, mean);
        }
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abstra_model::mock::MockBackend;
    use abstra_model::{
        Device, GenerationSettings, ModelBackend, ModelInfo, Precision, SamplingParams,
    };
    use approx::assert_relative_eq;

    fn sections() -> SectionMap {
        let mut map = SectionMap::new();
        map.push(Section::Background, "Plants need light");
        map.push(Section::Methods, "We grew seedlings in darkness");
        map.push(Section::Methods, "Others grew under lamps");
        map.push(Section::Conclusion, "Light drives growth");
        map
    }

    fn loaded(backend: impl ModelBackend + 'static) -> GenerationService {
        let mut svc = GenerationService::new(Box::new(backend), GenerationSettings::default());
        svc.load().unwrap();
        svc
    }

    /// Returns a fixed vector regardless of input.
    struct FixedAttributor(Vec<f64>);

    impl Attributor for FixedAttributor {
        fn ablate(
            &mut self,
            _model: &mut dyn ModelSession,
            _input: &SentenceTemplate,
            _target: &str,
        ) -> Result<Vec<f64>, AttributionError> {
            Ok(self.0.clone())
        }

        fn sample_attribute(
            &mut self,
            _model: &mut dyn ModelSession,
            _input: &SentenceTemplate,
            _target: &str,
            _n_samples: usize,
        ) -> Result<Vec<f64>, AttributionError> {
            Ok(self.0.clone())
        }
    }

    struct NanSession;

    impl ModelSession for NanSession {
        fn chat(&mut self, _p: &str, _params: &SamplingParams) -> Result<String, ModelError> {
            Ok(String::new())
        }

        fn log_likelihood(&mut self, _c: &str, _t: &str) -> Result<f64, ModelError> {
            Ok(f64::NAN)
        }

        fn info(&self) -> ModelInfo {
            ModelInfo {
                name: "nan".to_string(),
                backend: "nan".to_string(),
                precision: Precision::Float32,
                device: Device::Cpu,
            }
        }
    }

    struct NanBackend;

    impl ModelBackend for NanBackend {
        fn name(&self) -> &str {
            "nan"
        }

        fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
            Ok(Box::new(NanSession))
        }
    }

    #[test]
    fn test_template_render() {
        let t = SentenceTemplate::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(t.render(&[true, false, true]), "a c");
        assert_eq!(t.render(&[false, false, false]), "");
        assert_eq!(t.render_all(), "a b c");
    }

    #[test]
    fn test_section_means_from_fixed_values() {
        let mut svc = loaded(MockBackend::always("x"));
        let fixed = FixedAttributor(vec![0.4, 1.0, 3.0, -2.0]);
        let mut engine = AttributionEngine::new(Box::new(fixed));
        let out = engine.ablation_scores(&mut svc, &sections(), "Light drives growth");
        assert_eq!(out.outcome, AttributionOutcome::Computed);
        assert_relative_eq!(out.scores.background, 0.4);
        assert_relative_eq!(out.scores.objective, 0.0);
        assert_relative_eq!(out.scores.methods, 2.0);
        assert_relative_eq!(out.scores.results, 0.0);
        assert_relative_eq!(out.scores.conclusion, -2.0);
    }

    #[test]
    fn test_wrong_length_is_a_failure() {
        let mut svc = loaded(MockBackend::always("x"));
        let mut engine = AttributionEngine::new(Box::new(FixedAttributor(vec![1.0])));
        let out = engine.sampling_scores(&mut svc, &sections(), "hyp", 4);
        assert!(out.outcome.is_failure());
        assert_eq!(out.scores, SectionScores::zeros());
    }

    #[test]
    fn test_empty_sections_short_circuit() {
        let mut svc = loaded(MockBackend::always("x"));
        let mut engine = AttributionEngine::with_seed(Some(1));
        let out = engine.ablation_scores(&mut svc, &SectionMap::new(), "hyp");
        assert_eq!(out.outcome, AttributionOutcome::NoText);
        assert_eq!(out.scores, SectionScores::zeros());
    }

    #[test]
    fn test_blank_hypothesis_short_circuits() {
        let mut svc = loaded(MockBackend::always("x"));
        let mut engine = AttributionEngine::with_seed(Some(1));
        let out = engine.sampling_scores(&mut svc, &sections(), "  ", 5);
        assert_eq!(out.outcome, AttributionOutcome::EmptyTarget);
    }

    #[test]
    fn test_unloaded_model_yields_zeros() {
        let mut svc = GenerationService::new(
            Box::new(MockBackend::always("x")),
            GenerationSettings::default(),
        );
        let mut engine = AttributionEngine::with_seed(Some(1));
        let out = engine.ablation_scores(&mut svc, &sections(), "Light drives growth");
        assert!(out.outcome.is_failure());
        assert_eq!(out.scores, SectionScores::zeros());
    }

    #[test]
    fn test_nan_scores_are_failures() {
        let mut svc = loaded(NanBackend);
        let mut engine = AttributionEngine::with_seed(Some(1));
        let fa = engine.ablation_scores(&mut svc, &sections(), "Light drives growth");
        let sv = engine.sampling_scores(&mut svc, &sections(), "Light drives growth", 3);
        assert!(fa.outcome.is_failure() && sv.outcome.is_failure());
        assert!(fa.scores.all_finite() && sv.scores.all_finite());
    }

    #[test]
    fn test_mock_model_credits_borrowed_sentence() {
        let mut svc = loaded(MockBackend::always("x"));
        let mut engine = AttributionEngine::with_seed(Some(42));
        let fa = engine.ablation_scores(&mut svc, &sections(), "Light drives growth");
        assert_eq!(fa.outcome, AttributionOutcome::Computed);
        assert!(fa.scores.conclusion > 0.0);
        assert!(fa.scores.conclusion > fa.scores.background);
        assert_relative_eq!(fa.scores.objective, 0.0);

        let sv = engine.sampling_scores(&mut svc, &sections(), "Light drives growth", 8);
        assert_eq!(sv.outcome, AttributionOutcome::Computed);
        assert!(sv.scores.conclusion > sv.scores.methods);
    }

    #[test]
    fn test_reduce_rejects_non_finite() {
        let (_, spans) = sections().flatten();
        let err = reduce_to_sections(&[1.0, f64::INFINITY, 0.0, 0.0], &spans, 4).unwrap_err();
        assert!(matches!(err, AttributionError::NonFinite));
    }
}
