/// Data model shared by ingestion, analysis and rendering

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// One recognized character with its bounding region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedCharacter {
    /// Recognized text, case preserved. Usually one character but not guaranteed.
    pub char: String,
    /// Left edge, image pixels from the top-left origin
    pub x: i32,
    /// Top edge, image pixels from the top-left origin
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Engine confidence when the engine reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl DetectedCharacter {
    /// Detection with a zero-sized box at the origin, handy when only the text matters
    pub fn from_char(text: &str) -> Self {
        Self {
            char: text.to_string(),
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            confidence: None,
        }
    }
}

/// Result of comparing detections against the expected alphabet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Expected digits with no detection, in canonical order
    pub missing_numbers: Vec<char>,
    /// Expected letters with no detection, in canonical order
    pub missing_letters: Vec<char>,
    /// Original text of every detection outside the alphabet, one entry per detection
    pub unexpected_chars: Vec<String>,
    /// Canonical value -> count, only for counts above one
    pub duplicates: BTreeMap<String, usize>,
    /// Number of detections analyzed
    pub total_detected: usize,
}

impl AnalysisReport {
    /// True when every keycap was seen exactly once and nothing else was seen
    pub fn is_complete(&self) -> bool {
        self.missing_numbers.is_empty()
            && self.missing_letters.is_empty()
            && self.unexpected_chars.is_empty()
            && self.duplicates.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.missing_numbers.len() + self.missing_letters.len()
    }

    /// Unexpected characters with repeats removed, first occurrence wins
    pub fn unique_unexpected(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.unexpected_chars
            .iter()
            .map(String::as_str)
            .filter(|c| seen.insert(*c))
            .collect()
    }
}

/// Everything produced for one checked image
#[derive(Debug, Clone, Serialize)]
pub struct ImageAnalysis {
    /// Image path or name
    pub image: String,
    /// Hex SHA-256 of the image bytes
    pub sha256: String,
    /// Recognition engine that produced the detections
    pub engine: String,
    /// Image as a `data:` URL, kept for reports that embed the photo
    #[serde(skip)]
    pub data_url: String,
    pub detections: Vec<DetectedCharacter>,
    pub report: AnalysisReport,
}
