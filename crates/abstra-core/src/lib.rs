//! ABSTRA Core: section-targeted attribution for generated hypotheses.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          ABSTRA PIPELINE                           │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  AbstractRecord ──► Segmenter ──► SectionMap (5 sections)          │
//! │        │                              │                            │
//! │        └──► HypothesisGenerator ──► [Hypothesis; 3]                │
//! │                                       │                            │
//! │          ┌────────────────────────────┼────────────────────┐       │
//! │          ▼                            ▼                    ▼       │
//! │   AttributionEngine          AttributionEngine      SelfEvaluator  │
//! │   (feature ablation)         (Shapley sampling)     (FINAL SCORE)  │
//! │          │                            │                    │       │
//! │          └──────────────► AttributionResult ◄──────────────┘       │
//! │                                  │                                 │
//! │                          AbstractResult ──► JSON + CSV reports     │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All model access goes through [`abstra_model::GenerationService`]. The
//! per-abstract steps never fail on model errors; they degrade to empty
//! text, zero scores or the default evaluation score, and the
//! [`pipeline::AbstraPipeline`] skips any abstract that still fails.

pub mod attribution;
pub mod config;
pub mod evaluation;
pub mod hypothesis;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod section;
pub mod segmentation;

pub use attribution::{
    AttributionEngine, AttributionError, AttributionOutcome, Attributor, PerturbationAttributor,
    SectionAttribution, SentenceTemplate,
};
pub use config::{Config, ConfigError};
pub use evaluation::{Evaluation, SelfEvaluator};
pub use hypothesis::{Hypothesis, HypothesisGenerator};
pub use pipeline::{AbstraPipeline, OutcomeTally, PipelineError, RunOutcome, RunSummary};
pub use report::{AbstractRecord, AbstractResult, AttributionResult, ReportRow, ReportTable};
pub use section::{Section, SectionMap, SectionScores};
pub use segmentation::{PositionalSegmenter, Segmenter, SentenceSplitter};
