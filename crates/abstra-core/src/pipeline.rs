//! Pipeline orchestrator.
//!
//! ```text
//!            ┌──────────────────────── per abstract (failure boundary) ───────────────────────┐
//! CSV row ──►│ segment ──► 3 × hypothesis ──► for each: ablation │ sampling │ self-eval ──► reclaim │──► AbstractResult
//!            └────────────────────────────────────────────────────────────────────────────────┘
//!                                        every N successes: unload + load
//! ```
//!
//! A row that errors or panics is logged and skipped. Only model load,
//! model reload, reading the input table and writing outputs end a run.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use abstra_model::{create_backend, GenerationService, ModelBackend, ModelError};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::attribution::{AttributionEngine, AttributionOutcome};
use crate::config::{Config, ConfigError};
use crate::evaluation::SelfEvaluator;
use crate::hypothesis::HypothesisGenerator;
use crate::logging::RunLog;
use crate::report::{
    self, AbstractRecord, AbstractResult, AttributionResult, ReportError, ReportTable,
    CSV_FILE_NAME, JSON_FILE_NAME,
};
use crate::segmentation::{PositionalSegmenter, Segmenter};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("failed to set up run log in {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("abstract `{title}` has no text")]
    EmptyAbstract { title: String },
    #[error("panic while processing `{title}`: {message}")]
    Panicked { title: String, message: String },
}

/// Counts of attribution outcomes across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub computed: usize,
    pub no_text: usize,
    pub empty_target: usize,
    pub failed: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: &AttributionOutcome) {
        match outcome {
            AttributionOutcome::Computed => self.computed += 1,
            AttributionOutcome::NoText => self.no_text += 1,
            AttributionOutcome::EmptyTarget => self.empty_target += 1,
            AttributionOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Score maps that hold zeros because nothing was computed.
    pub fn defaulted(&self) -> usize {
        self.no_text + self.empty_target + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_read: usize,
    pub processed: usize,
    pub skipped: usize,
    pub reloads: usize,
    pub attribution: OutcomeTally,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows read, {} processed, {} skipped, {} reloads; attribution: {} computed, {} defaulted ({} failed)",
            self.rows_read,
            self.processed,
            self.skipped,
            self.reloads,
            self.attribution.computed,
            self.attribution.defaulted(),
            self.attribution.failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub results: Vec<AbstractResult>,
    pub table: ReportTable,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    pub summary: RunSummary,
}

pub struct AbstraPipeline {
    config: Config,
    service: GenerationService,
    segmenter: PositionalSegmenter,
    generator: HypothesisGenerator,
    attribution: AttributionEngine,
    evaluator: SelfEvaluator,
    tally: OutcomeTally,
    log: RunLog,
}

impl AbstraPipeline {
    /// Build a pipeline over the backend named in `config.model`.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        let backend = create_backend(&config.model)?;
        Self::with_backend(config, backend)
    }

    /// Build a pipeline over an explicit backend. Starts the run log, which
    /// truncates any previous log in the output directory.
    pub fn with_backend(
        config: Config,
        backend: Box<dyn ModelBackend>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let output_dir = config.paths.output_dir.clone();
        let log = RunLog::init(&output_dir, &config.logging.level).map_err(|source| {
            PipelineError::Log {
                path: output_dir,
                source,
            }
        })?;

        let service = GenerationService::new(backend, config.generation.settings());
        Ok(Self {
            segmenter: PositionalSegmenter::new(config.segmentation.splitter),
            generator: HypothesisGenerator::new(),
            attribution: AttributionEngine::with_seed(config.attribution.seed),
            evaluator: SelfEvaluator::new(config.evaluation.max_length),
            tally: OutcomeTally::default(),
            service,
            config,
            log,
        })
    }

    /// Swap the attribution engine, e.g. for a stub attributor.
    pub fn with_attribution(mut self, engine: AttributionEngine) -> Self {
        self.attribution = engine;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &GenerationService {
        &self.service
    }

    pub fn log_path(&self) -> &std::path::Path {
        self.log.path()
    }

    /// Run one abstract through segmentation, hypothesis generation,
    /// attribution and self-evaluation. Expects the model to be loaded;
    /// with no model every step degrades to its default.
    pub fn process_abstract(
        &mut self,
        record: &AbstractRecord,
    ) -> Result<AbstractResult, PipelineError> {
        let title = record.title.as_str();
        let abstract_text = record.abstract_text.as_str();
        if abstract_text.trim().is_empty() {
            return Err(PipelineError::EmptyAbstract {
                title: title.to_string(),
            });
        }
        info!("Processing: {title}");

        let features = self.segmenter.segment(abstract_text);
        debug!(
            "segmented into {} sentences ({})",
            features.sentence_count(),
            features
                .iter()
                .map(|(s, items)| format!("{s}={}", items.len()))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let hypotheses = self
            .generator
            .generate(&mut self.service, abstract_text, title);

        let n_samples = self.config.attribution.shapley_samples;
        let mut attribution_results = Vec::with_capacity(hypotheses.len());
        for hypothesis in &hypotheses {
            let text = hypothesis.hypothesis_text.as_str();
            let fa = self
                .attribution
                .ablation_scores(&mut self.service, &features, text);
            let sv = self
                .attribution
                .sampling_scores(&mut self.service, &features, text, n_samples);
            self.note_outcome(hypothesis.hypothesis_id, "FA", &fa.outcome);
            self.note_outcome(hypothesis.hypothesis_id, "Shapley", &sv.outcome);

            let evaluation = self
                .evaluator
                .evaluate(&mut self.service, title, abstract_text, text);

            attribution_results.push(AttributionResult {
                hypothesis_id: hypothesis.hypothesis_id,
                fa_scores: fa.scores,
                shapley_scores: sv.scores,
                self_eval_score: evaluation.score,
                self_eval_text: evaluation.raw_text,
            });
            self.service.reclaim_memory();
        }

        Ok(AbstractResult {
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            features,
            hypotheses,
            attribution_results,
        })
    }

    fn note_outcome(&mut self, hypothesis_id: u32, method: &str, outcome: &AttributionOutcome) {
        match outcome {
            AttributionOutcome::Computed => {}
            AttributionOutcome::NoText => {
                debug!("hypothesis {hypothesis_id}: {method} defaulted, abstract has no sentences")
            }
            AttributionOutcome::EmptyTarget => {
                debug!("hypothesis {hypothesis_id}: {method} defaulted, hypothesis is empty")
            }
            AttributionOutcome::Failed(reason) => {
                warn!("hypothesis {hypothesis_id}: {method} defaulted to zeros: {reason}")
            }
        }
        self.tally.record(outcome);
    }

    /// Read the configured input table and process it.
    pub fn run(&mut self) -> Result<RunOutcome, PipelineError> {
        let input = self.config.paths.input_csv.clone();
        let records = report::read_input_csv(&input)?;
        info!("Loaded {} abstracts from {}", records.len(), input.display());
        self.run_records(&records)
    }

    /// Process `records` in order and write both output files.
    pub fn run_records(&mut self, records: &[AbstractRecord]) -> Result<RunOutcome, PipelineError> {
        info!("{}", "=".repeat(50));
        info!("Starting ABSTRA Pipeline");
        info!("{}", "=".repeat(50));

        self.tally = OutcomeTally::default();
        self.service.load()?;

        let every = self.config.processing.reload_model_every;
        let total = records.len();
        let mut summary = RunSummary {
            rows_read: total,
            ..RunSummary::default()
        };
        let mut results = Vec::with_capacity(total);

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("Processing: [{bar:40}] {pos}/{len} ({eta})")
        {
            pb.set_style(style);
        }

        for (idx, record) in records.iter().enumerate() {
            match self.guarded_process(record) {
                Ok(result) => {
                    results.push(result);
                    summary.processed += 1;
                    if summary.processed % every == 0 && idx + 1 < total {
                        self.service.reload()?;
                        summary.reloads += 1;
                    }
                }
                Err(e) => {
                    error!("Error processing row {idx}: {e}");
                    summary.skipped += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        self.service.unload();
        summary.attribution = self.tally;

        let output_dir = self.config.paths.output_dir.clone();
        std::fs::create_dir_all(&output_dir).map_err(|source| PipelineError::Log {
            path: output_dir.clone(),
            source,
        })?;

        let json_path = output_dir.join(JSON_FILE_NAME);
        report::write_json(&json_path, &results)?;
        info!("Saved JSON to {}", json_path.display());

        let table = report::flatten(&results)?;
        let csv_path = output_dir.join(CSV_FILE_NAME);
        report::write_csv(&csv_path, &table)?;
        info!("Saved CSV to {}", csv_path.display());

        info!("Run summary: {summary}");
        info!("Pipeline complete!");
        Ok(RunOutcome {
            results,
            table,
            json_path,
            csv_path,
            summary,
        })
    }

    /// `process_abstract` with panics converted into errors.
    fn guarded_process(
        &mut self,
        record: &AbstractRecord,
    ) -> Result<AbstractResult, PipelineError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.process_abstract(record))) {
            Ok(result) => result,
            Err(payload) => Err(PipelineError::Panicked {
                title: record.title.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
