//! The five rhetorical sections of an abstract and per-section containers.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Background,
    Objective,
    Methods,
    Results,
    Conclusion,
}

impl Section {
    /// All sections, in abstract order.
    pub const ALL: [Section; 5] = [
        Section::Background,
        Section::Objective,
        Section::Methods,
        Section::Results,
        Section::Conclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Background => "background",
            Section::Objective => "objective",
            Section::Methods => "methods",
            Section::Results => "results",
            Section::Conclusion => "conclusion",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SectionMap
// ============================================================================

/// An abstract's sentences partitioned into the five sections.
///
/// Every section is always present; an absent section is an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMap {
    pub background: Vec<String>,
    pub objective: Vec<String>,
    pub methods: Vec<String>,
    pub results: Vec<String>,
    pub conclusion: Vec<String>,
}

/// Half-open `[start, end)` ranges of each section inside a flattened
/// sentence list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionSpans([(usize, usize); 5]);

impl SectionSpans {
    pub fn get(&self, section: Section) -> (usize, usize) {
        self.0[section.index()]
    }
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section: Section) -> &[String] {
        match section {
            Section::Background => &self.background,
            Section::Objective => &self.objective,
            Section::Methods => &self.methods,
            Section::Results => &self.results,
            Section::Conclusion => &self.conclusion,
        }
    }

    pub fn get_mut(&mut self, section: Section) -> &mut Vec<String> {
        match section {
            Section::Background => &mut self.background,
            Section::Objective => &mut self.objective,
            Section::Methods => &mut self.methods,
            Section::Results => &mut self.results,
            Section::Conclusion => &mut self.conclusion,
        }
    }

    pub fn push(&mut self, section: Section, sentence: impl Into<String>) {
        self.get_mut(section).push(sentence.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (Section, &[String])> + '_ {
        Section::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    pub fn sentence_count(&self) -> usize {
        self.iter().map(|(_, s)| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sentence_count() == 0
    }

    /// Section text with sentences joined by a single space.
    pub fn joined(&self, section: Section) -> String {
        self.get(section).join(" ")
    }

    /// All sentences in section order, plus where each section landed.
    pub fn flatten(&self) -> (Vec<String>, SectionSpans) {
        let mut sentences = Vec::with_capacity(self.sentence_count());
        let mut spans = [(0usize, 0usize); 5];
        for (section, items) in self.iter() {
            let start = sentences.len();
            sentences.extend(items.iter().cloned());
            spans[section.index()] = (start, sentences.len());
        }
        (sentences, SectionSpans(spans))
    }
}

// ============================================================================
// SectionScores
// ============================================================================

/// One score per section, 0.0 unless set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionScores {
    pub background: f64,
    pub objective: f64,
    pub methods: f64,
    pub results: f64,
    pub conclusion: f64,
}

impl SectionScores {
    pub fn zeros() -> Self {
        Self::default()
    }

    pub fn get(&self, section: Section) -> f64 {
        match section {
            Section::Background => self.background,
            Section::Objective => self.objective,
            Section::Methods => self.methods,
            Section::Results => self.results,
            Section::Conclusion => self.conclusion,
        }
    }

    pub fn set(&mut self, section: Section, value: f64) {
        match section {
            Section::Background => self.background = value,
            Section::Objective => self.objective = value,
            Section::Methods => self.methods = value,
            Section::Results => self.results = value,
            Section::Conclusion => self.conclusion = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Section, f64)> + '_ {
        Section::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    pub fn all_finite(&self) -> bool {
        self.iter().all(|(_, v)| v.is_finite())
    }
}
