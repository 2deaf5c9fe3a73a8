//! Positional segmentation of abstracts into sections.
//!
//! Sentence `i` of `n` lands in band `floor(5·i/n)`: five bands of width
//! 0.2 along the sentence sequence. Abstracts of three sentences or fewer
//! are too short to band and go entirely to `methods`.

use crate::section::{Section, SectionMap};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// At or below this many sentences everything goes to `methods`.
pub const SHORT_ABSTRACT_SENTENCES: usize = 3;

/// Turns abstract text into a [`SectionMap`].
pub trait Segmenter {
    fn segment(&self, text: &str) -> SectionMap;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentenceSplitter {
    /// Unicode (UAX #29) sentence boundaries, with period splitting as
    /// fallback.
    #[default]
    Unicode,
    /// Split on `.` only.
    Period,
}

impl SentenceSplitter {
    pub fn split(&self, text: &str) -> Vec<String> {
        match self {
            SentenceSplitter::Unicode => {
                let sentences: Vec<String> = text
                    .unicode_sentences()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if sentences.is_empty() {
                    split_on_periods(text)
                } else {
                    sentences
                }
            }
            SentenceSplitter::Period => split_on_periods(text),
        }
    }
}

fn split_on_periods(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalSegmenter {
    splitter: SentenceSplitter,
}

impl PositionalSegmenter {
    pub fn new(splitter: SentenceSplitter) -> Self {
        Self { splitter }
    }
}

impl Segmenter for PositionalSegmenter {
    fn segment(&self, text: &str) -> SectionMap {
        let sentences = self.splitter.split(text);
        assign_sections(sentences)
    }
}

/// Band already-split sentences into sections.
pub fn assign_sections(sentences: Vec<String>) -> SectionMap {
    let mut map = SectionMap::new();
    let n = sentences.len();
    if n <= SHORT_ABSTRACT_SENTENCES {
        map.methods = sentences;
        return map;
    }
    for (i, sentence) in sentences.into_iter().enumerate() {
        let band = (i * Section::ALL.len() / n).min(Section::ALL.len() - 1);
        map.push(Section::ALL[band], sentence);
    }
    map
}
