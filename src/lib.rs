/// Keycap Check - verifies that a keyboard photo shows every keycap
///
/// This library compares characters recognized in a keyboard photo against the
/// expected set of digits 0-9 and letters A-Z, and reports missing, unexpected
/// and duplicated characters.

pub mod config;
pub mod core;
pub mod utils;

// Re-export main types for convenience
pub use crate::core::analyzer::{analyze, KeyboardAnalyzer};
pub use crate::core::model::{AnalysisReport, DetectedCharacter, ImageAnalysis};
pub use crate::core::recognizer::{RecognitionError, Recognizer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check a single keyboard photo with the tesseract engine
///
/// This is a convenience function for simple use cases.
///
/// # Arguments
///
/// * `image_path` - Path to the keyboard photo
/// * `config` - Recognition engine settings
pub fn check_image<P: AsRef<std::path::Path>>(
    image_path: P,
    config: &config::RecognitionConfig,
) -> anyhow::Result<ImageAnalysis> {
    let recognizer = crate::core::recognizer::TesseractCli::new(config.clone());
    KeyboardAnalyzer::new(Box::new(recognizer)).check_file(image_path.as_ref())
}

/// Command-line application functionality
pub mod app {
    use std::path::{Path, PathBuf};

    use anyhow::Context;
    use log::{info, warn};
    use rayon::prelude::*;

    use crate::config::RecognitionConfig;
    use crate::core::analyzer::KeyboardAnalyzer;
    use crate::core::model::ImageAnalysis;
    use crate::core::recognizer::{RecordedRecognition, Recognizer, TesseractCli};

    /// Pick the recognition engine: a recording when one is given, tesseract otherwise
    pub fn build_recognizer(
        config: &RecognitionConfig,
        recording: Option<&Path>,
    ) -> anyhow::Result<Box<dyn Recognizer>> {
        if let Some(path) = recording {
            info!("Replaying recognition from {}", path.display());
            let recorded = RecordedRecognition::from_file(path)
                .with_context(|| format!("Failed to load recording: {}", path.display()))?;
            return Ok(Box::new(recorded));
        }

        let engine = TesseractCli::new(config.clone());
        if !engine.is_available() {
            warn!("Tesseract executable `{}` did not respond to --version", config.tesseract_path);
        }
        Ok(Box::new(engine))
    }

    /// Check several images in parallel on the current rayon pool
    ///
    /// `on_done` is called once per finished image, from the worker thread
    /// that checked it.
    ///
    /// # Returns
    ///
    /// One entry per image, in input order, each holding either the analysis
    /// or the error that stopped it
    pub fn run_checks<P, F>(
        image_paths: &[P],
        analyzer: &KeyboardAnalyzer,
        on_done: F,
    ) -> Vec<(PathBuf, anyhow::Result<ImageAnalysis>)>
    where
        P: AsRef<Path> + Sync,
        F: Fn() + Sync,
    {
        image_paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                let result = analyzer.check_file(path);
                on_done();
                (path.to_path_buf(), result)
            })
            .collect()
    }
}
