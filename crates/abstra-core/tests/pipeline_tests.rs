//! Orchestrator behaviour against stub backends: degraded models, panics,
//! reload cadence and fatal errors.

use abstra_core::config::Config;
use abstra_core::pipeline::{AbstraPipeline, PipelineError};
use abstra_core::report::{AbstractRecord, ReportError};
use abstra_core::section::SectionScores;
use abstra_model::mock::MockBackend;
use abstra_model::{
    BackendKind, Device, ModelBackend, ModelError, ModelInfo, ModelSession, Precision,
    SamplingParams,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn stub_info(name: &str) -> ModelInfo {
    ModelInfo {
        name: name.to_string(),
        backend: "stub".to_string(),
        precision: Precision::Float32,
        device: Device::Cpu,
    }
}

/// Every call fails.
struct FailingBackend;

struct FailingSession;

impl ModelSession for FailingSession {
    fn chat(&mut self, _prompt: &str, _params: &SamplingParams) -> Result<String, ModelError> {
        Err(ModelError::Api("server exploded".to_string()))
    }

    fn log_likelihood(&mut self, _context: &str, _target: &str) -> Result<f64, ModelError> {
        Err(ModelError::Api("server exploded".to_string()))
    }

    fn info(&self) -> ModelInfo {
        stub_info("failing")
    }
}

impl ModelBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        Ok(Box::new(FailingSession))
    }
}

/// Chat works, scoring does not.
struct NoScoringBackend;

struct NoScoringSession;

impl ModelSession for NoScoringSession {
    fn chat(&mut self, _prompt: &str, _params: &SamplingParams) -> Result<String, ModelError> {
        Ok("Fungi protect roots. FINAL SCORE: 0.6".to_string())
    }

    fn log_likelihood(&mut self, _context: &str, _target: &str) -> Result<f64, ModelError> {
        Err(ModelError::Unsupported("no logprobs".to_string()))
    }

    fn info(&self) -> ModelInfo {
        stub_info("no-scoring")
    }
}

impl ModelBackend for NoScoringBackend {
    fn name(&self) -> &str {
        "no-scoring"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        Ok(Box::new(NoScoringSession))
    }
}

/// Panics on any prompt mentioning `trigger`.
struct PanickingBackend {
    trigger: &'static str,
}

struct PanickingSession {
    trigger: &'static str,
}

impl ModelSession for PanickingSession {
    fn chat(&mut self, prompt: &str, _params: &SamplingParams) -> Result<String, ModelError> {
        if prompt.contains(self.trigger) {
            panic!("tokenizer overflow");
        }
        Ok("A hypothesis. FINAL SCORE: 0.5".to_string())
    }

    fn log_likelihood(&mut self, _context: &str, _target: &str) -> Result<f64, ModelError> {
        Ok(-1.0)
    }

    fn info(&self) -> ModelInfo {
        stub_info("panicking")
    }
}

impl ModelBackend for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        Ok(Box::new(PanickingSession {
            trigger: self.trigger,
        }))
    }
}

/// Counts loads and delegates to the mock.
struct CountingBackend {
    inner: MockBackend,
    loads: Arc<AtomicUsize>,
}

impl ModelBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }
}

struct UnreachableBackend;

impl ModelBackend for UnreachableBackend {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        Err(ModelError::Load {
            model: "ghost".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

fn test_config() -> (Config, TempDir) {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.model.backend = BackendKind::Mock;
    config.paths.output_dir = dir.path().join("results");
    config.attribution.shapley_samples = 2;
    config.attribution.seed = Some(1);
    (config, dir)
}

fn abstract_record(title: &str) -> AbstractRecord {
    AbstractRecord::new(
        title,
        "Drought stresses crops. We tested a coating. Plots were treated or not. \
         Treated plots kept more water. Coatings may help farms.",
    )
}

#[test]
fn failing_model_still_yields_full_records() {
    let (config, _dir) = test_config();
    let mut pipeline = AbstraPipeline::with_backend(config, Box::new(FailingBackend)).unwrap();
    let outcome = pipeline.run_records(&[abstract_record("Dry")]).unwrap();

    assert_eq!(outcome.summary.processed, 1);
    let result = &outcome.results[0];
    assert_eq!(result.features.sentence_count(), 5);
    assert_eq!(result.hypotheses.len(), 3);
    for hypothesis in &result.hypotheses {
        assert!(hypothesis.hypothesis_text.is_empty());
        let attr = result.attribution_for(hypothesis.hypothesis_id).unwrap();
        assert_eq!(attr.fa_scores, SectionScores::zeros());
        assert_eq!(attr.shapley_scores, SectionScores::zeros());
        assert_eq!(attr.self_eval_score, 0.5);
        assert!(attr.self_eval_text.is_empty());
    }
    // blank hypotheses are never sent to the scorer
    assert_eq!(outcome.summary.attribution.empty_target, 6);
    assert_eq!(outcome.table.shape(), (3, 21));
}

#[test]
fn scoring_failures_are_counted_not_fatal() {
    let (config, _dir) = test_config();
    let mut pipeline = AbstraPipeline::with_backend(config, Box::new(NoScoringBackend)).unwrap();
    let outcome = pipeline.run_records(&[abstract_record("Wet")]).unwrap();

    assert_eq!(outcome.summary.processed, 1);
    assert_eq!(outcome.summary.attribution.failed, 6);
    assert_eq!(outcome.summary.attribution.computed, 0);
    for row in &outcome.table.rows {
        assert_eq!(row.model_self_evaluated_score, 0.6);
        assert_eq!(row.fa_methods, 0.0);
        assert_eq!(row.shapley_conclusion, 0.0);
    }
}

#[test]
fn panicking_row_is_skipped() {
    let (config, _dir) = test_config();
    let backend = PanickingBackend { trigger: "Cursed" };
    let mut pipeline = AbstraPipeline::with_backend(config, Box::new(backend)).unwrap();
    let rows = [
        abstract_record("First"),
        abstract_record("Cursed"),
        abstract_record("Third"),
    ];
    let outcome = pipeline.run_records(&rows).unwrap();

    assert_eq!(outcome.summary.processed, 2);
    assert_eq!(outcome.summary.skipped, 1);
    let titles: Vec<_> = outcome.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["First", "Third"]);

    let log = std::fs::read_to_string(pipeline.log_path()).unwrap();
    assert!(log.contains("Error processing row 1"));
    assert!(log.contains("tokenizer overflow"));
}

#[test]
fn reload_cadence_over_45_rows() {
    let (mut config, _dir) = test_config();
    config.processing.reload_model_every = 20;
    config.attribution.shapley_samples = 1;
    let loads = Arc::new(AtomicUsize::new(0));
    let backend = CountingBackend {
        inner: MockBackend::from_config(&config.model),
        loads: loads.clone(),
    };
    let mut pipeline = AbstraPipeline::with_backend(config, Box::new(backend)).unwrap();
    let rows: Vec<_> = (0..45)
        .map(|i| abstract_record(&format!("Paper {i}")))
        .collect();

    let outcome = pipeline.run_records(&rows).unwrap();
    assert_eq!(outcome.summary.processed, 45);
    assert_eq!(outcome.summary.reloads, 2);
    assert_eq!(loads.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.service().stats().unloads, 3);
}

#[test]
fn reload_cadence_exact_multiple_skips_final_reload() {
    let (mut config, _dir) = test_config();
    config.processing.reload_model_every = 3;
    config.attribution.shapley_samples = 1;
    let mut pipeline = AbstraPipeline::new(config).unwrap();
    let rows: Vec<_> = (0..6).map(|i| abstract_record(&format!("P{i}"))).collect();
    let outcome = pipeline.run_records(&rows).unwrap();
    assert_eq!(outcome.summary.reloads, 1);
}

#[test]
fn load_failure_is_fatal() {
    let (config, _dir) = test_config();
    let mut pipeline = AbstraPipeline::with_backend(config, Box::new(UnreachableBackend)).unwrap();
    let err = pipeline.run_records(&[abstract_record("Any")]).unwrap_err();
    assert!(matches!(err, PipelineError::Model(ModelError::Load { .. })));
}

#[test]
fn missing_input_is_fatal() {
    let (mut config, dir) = test_config();
    config.paths.input_csv = dir.path().join("nope.csv");
    let mut pipeline = AbstraPipeline::new(config).unwrap();
    assert!(matches!(
        pipeline.run(),
        Err(PipelineError::Report(ReportError::Io { .. }))
    ));
}

#[test]
fn short_input_row_is_skipped_not_fatal() {
    let (mut config, dir) = test_config();
    let input = dir.path().join("abstracts.csv");
    std::fs::write(
        &input,
        "Title,Abstract\n\
         Good,\"Heat slows growth. We grew plants warm or cool.\"\n\
         Ragged\n\
         Also good,\"Salt harms roots. We added salt to pots.\"\n",
    )
    .unwrap();
    config.paths.input_csv = input;
    let mut pipeline = AbstraPipeline::new(config).unwrap();
    let outcome = pipeline.run().unwrap();

    assert_eq!(outcome.summary.rows_read, 3);
    assert_eq!(outcome.summary.processed, 2);
    assert_eq!(outcome.summary.skipped, 1);
    let titles: Vec<_> = outcome.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Good", "Also good"]);
}

#[test]
fn missing_abstract_column_is_fatal() {
    let (mut config, dir) = test_config();
    let input = dir.path().join("abstracts.csv");
    std::fs::write(&input, "Title,Body\nx,y\n").unwrap();
    config.paths.input_csv = input;
    let mut pipeline = AbstraPipeline::new(config).unwrap();
    assert!(matches!(
        pipeline.run(),
        Err(PipelineError::Report(ReportError::MissingColumn("Abstract")))
    ));
}

#[test]
fn invalid_config_is_rejected() {
    let (mut config, _dir) = test_config();
    config.processing.reload_model_every = 0;
    assert!(matches!(
        AbstraPipeline::new(config),
        Err(PipelineError::Config(_))
    ));
}
