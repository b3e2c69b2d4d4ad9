/// Core keycap analyzer implementation
///
/// `analyze` compares detections against the expected alphabet. It is pure and
/// never fails. `KeyboardAnalyzer` wraps it with a recognition engine to run the
/// full image-to-report pipeline.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::core::alphabet::{self, EXPECTED_ALPHABET};
use crate::core::ingestion;
use crate::core::model::{AnalysisReport, DetectedCharacter, ImageAnalysis};
use crate::core::recognizer::Recognizer;
use crate::utils::image_utils::{self, KeyboardImage};

/// Compare detections against the expected digits and letters.
///
/// Missing characters are computed from canonical-set membership, while
/// unexpected characters and duplicates come from per-detection counts. The
/// two groupings are independent: a keycap can be present and duplicated,
/// and an unexpected character is never missing.
pub fn analyze(detected: &[DetectedCharacter]) -> AnalysisReport {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut unexpected_chars = Vec::new();

    for detection in detected {
        let canonical = alphabet::canonicalize(&detection.char);
        if !alphabet::is_expected(&canonical) {
            unexpected_chars.push(detection.char.clone());
        }
        *counts.entry(canonical).or_insert(0) += 1;
    }

    let is_missing = |c: &char| !counts.contains_key(c.to_string().as_str());
    let missing_numbers = EXPECTED_ALPHABET.numbers.iter().copied().filter(is_missing).collect();
    let missing_letters = EXPECTED_ALPHABET.letters.iter().copied().filter(is_missing).collect();

    let duplicates: BTreeMap<String, usize> = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(c, &count)| (c.clone(), count))
        .collect();

    AnalysisReport {
        missing_numbers,
        missing_letters,
        unexpected_chars,
        duplicates,
        total_detected: detected.len(),
    }
}

/// Runs recognition and analysis for keyboard images
pub struct KeyboardAnalyzer {
    /// Engine producing the raw recognition output
    recognizer: Box<dyn Recognizer>,
}

impl KeyboardAnalyzer {
    pub fn new(recognizer: Box<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    /// Name of the engine in use
    pub fn engine(&self) -> &str {
        self.recognizer.name()
    }

    /// Load an image from disk and check it
    pub fn check_file(&self, path: &Path) -> Result<ImageAnalysis> {
        let image = image_utils::load_image(path)?;
        self.check_image(&image)
    }

    /// Recognize the characters in an image and analyze them.
    ///
    /// Recognition errors abort the check; analysis only runs on a complete
    /// set of detections.
    pub fn check_image(&self, image: &KeyboardImage) -> Result<ImageAnalysis> {
        info!("Checking keyboard image: {}", image.name());
        let start_time = Instant::now();

        let detections = ingestion::recognize_characters(self.recognizer.as_ref(), image)
            .with_context(|| format!("Recognition failed for {}", image.name()))?;

        let report = analyze(&detections);
        debug!("Report for {}: {:?}", image.name(), report);

        if report.is_complete() {
            info!("All {} keycaps found in {}", EXPECTED_ALPHABET.symbol_count(), image.name());
        } else {
            warn!(
                "{}: {} missing, {} unexpected, {} duplicated",
                image.name(),
                report.missing_count(),
                report.unexpected_chars.len(),
                report.duplicates.len()
            );
        }
        info!("Check completed in {:?}", start_time.elapsed());

        Ok(ImageAnalysis {
            image: image.name(),
            sha256: image.sha256.clone(),
            engine: self.engine().to_string(),
            data_url: image.to_data_url(),
            detections,
            report,
        })
    }
}
