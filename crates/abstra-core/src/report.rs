//! Input table, structured results and the flattened output table.
//!
//! ```text
//! abstracts.csv ──read_input_csv──► [AbstractRecord]
//!                                         │ pipeline
//!                                         ▼
//!                                  [AbstractResult] ──write_json──► complete_results.json
//!                                         │ flatten (one row per hypothesis)
//!                                         ▼
//!                                    ReportTable ──write_csv──► abstra_results.csv
//! ```

use crate::hypothesis::Hypothesis;
use crate::section::{Section, SectionMap, SectionScores};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const JSON_FILE_NAME: &str = "complete_results.json";
pub const CSV_FILE_NAME: &str = "abstra_results.csv";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("input is missing the `{0}` column")]
    MissingColumn(&'static str),
    #[error("inconsistent result for `{title}`: {reason}")]
    Inconsistent { title: String, reason: String },
}

/// One input row. Columns other than `Title` and `Abstract` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Abstract")]
    pub abstract_text: String,
}

impl AbstractRecord {
    pub fn new(title: impl Into<String>, abstract_text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub hypothesis_id: u32,
    pub fa_scores: SectionScores,
    pub shapley_scores: SectionScores,
    pub self_eval_score: f64,
    pub self_eval_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractResult {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub features: SectionMap,
    pub hypotheses: Vec<Hypothesis>,
    pub attribution_results: Vec<AttributionResult>,
}

impl AbstractResult {
    /// Attribution for a hypothesis, found by id.
    pub fn attribution_for(&self, hypothesis_id: u32) -> Option<&AttributionResult> {
        self.attribution_results
            .iter()
            .find(|a| a.hypothesis_id == hypothesis_id)
    }
}

// ============================================================================
// Flattened table
// ============================================================================

/// One output row per (abstract, hypothesis). Field order is column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub hypothesis_id: u32,
    pub hypothesis: String,
    pub model_self_evaluated_score: f64,
    pub model_response: String,
    pub abstract_background: String,
    pub abstract_objective: String,
    pub abstract_methods: String,
    pub abstract_results: String,
    pub abstract_conclusion: String,
    pub fa_background: f64,
    pub fa_objective: f64,
    pub fa_methods: f64,
    pub fa_results: f64,
    pub fa_conclusion: f64,
    pub shapley_background: f64,
    pub shapley_objective: f64,
    pub shapley_methods: f64,
    pub shapley_results: f64,
    pub shapley_conclusion: f64,
}

impl ReportRow {
    pub const COLUMNS: [&'static str; 21] = [
        "title",
        "abstract",
        "hypothesis_id",
        "hypothesis",
        "model_self_evaluated_score",
        "model_response",
        "abstract_background",
        "abstract_objective",
        "abstract_methods",
        "abstract_results",
        "abstract_conclusion",
        "fa_background",
        "fa_objective",
        "fa_methods",
        "fa_results",
        "fa_conclusion",
        "shapley_background",
        "shapley_objective",
        "shapley_methods",
        "shapley_results",
        "shapley_conclusion",
    ];

    fn build(
        result: &AbstractResult,
        hypothesis: &Hypothesis,
        attribution: &AttributionResult,
    ) -> Self {
        let text = |s: Section| result.features.joined(s);
        let fa = &attribution.fa_scores;
        let sv = &attribution.shapley_scores;
        Self {
            title: result.title.clone(),
            abstract_text: result.abstract_text.clone(),
            hypothesis_id: hypothesis.hypothesis_id,
            hypothesis: hypothesis.hypothesis_text.clone(),
            model_self_evaluated_score: attribution.self_eval_score,
            model_response: attribution.self_eval_text.clone(),
            abstract_background: text(Section::Background),
            abstract_objective: text(Section::Objective),
            abstract_methods: text(Section::Methods),
            abstract_results: text(Section::Results),
            abstract_conclusion: text(Section::Conclusion),
            fa_background: fa.background,
            fa_objective: fa.objective,
            fa_methods: fa.methods,
            fa_results: fa.results,
            fa_conclusion: fa.conclusion,
            shapley_background: sv.background,
            shapley_objective: sv.objective,
            shapley_methods: sv.methods,
            shapley_results: sv.results,
            shapley_conclusion: sv.conclusion,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportTable {
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), ReportRow::COLUMNS.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flatten results into one row per hypothesis, in hypothesis order.
pub fn flatten(results: &[AbstractResult]) -> Result<ReportTable, ReportError> {
    let mut rows = Vec::new();
    for result in results {
        for hypothesis in &result.hypotheses {
            let attribution = result
                .attribution_for(hypothesis.hypothesis_id)
                .ok_or_else(|| ReportError::Inconsistent {
                    title: result.title.clone(),
                    reason: format!("no attribution for hypothesis {}", hypothesis.hypothesis_id),
                })?;
            rows.push(ReportRow::build(result, hypothesis, attribution));
        }
    }
    Ok(ReportTable { rows })
}

// ============================================================================
// I/O
// ============================================================================

/// Read `Title`/`Abstract` rows. A missing header is fatal; a short row
/// yields empty cells, which the pipeline then skips as a blank abstract.
pub fn parse_input<R: Read>(reader: R) -> Result<Vec<AbstractRecord>, ReportError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(ReportError::MissingColumn(name))
    };
    let title_idx = column("Title")?;
    let abstract_idx = column("Abstract")?;

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        records.push(AbstractRecord::new(
            row.get(title_idx).unwrap_or_default(),
            row.get(abstract_idx).unwrap_or_default(),
        ));
    }
    Ok(records)
}

pub fn read_input_csv(path: &Path) -> Result<Vec<AbstractRecord>, ReportError> {
    let file = std::fs::File::open(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_input(std::io::BufReader::new(file))
}

pub fn write_json(path: &Path, results: &[AbstractResult]) -> Result<(), ReportError> {
    let file = std::fs::File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn write_table<W: Write>(writer: W, table: &ReportTable) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if table.is_empty() {
        wtr.write_record(ReportRow::COLUMNS)?;
    }
    for row in &table.rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_csv(path: &Path, table: &ReportTable) -> Result<(), ReportError> {
    let file = std::fs::File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_table(file, table)
}
